//! Thinking fillers: short acknowledgments that mask backend latency.
//!
//! The scheduler is armed per request. The runtime owns the actual delay and
//! backstop timers; this module decides whether a firing timer may still play
//! and what to say.

use crate::audio::Channel;
use crate::config::DialogueConfig;

const EMPATHETIC: &[&str] = &[
    "I'm right here with you.",
    "I hear you.",
    "That sounds really hard.",
];

const PROCESSING: &[&str] = &[
    "Give me just a moment.",
    "I'm still with you, one moment.",
    "Let me think about that.",
];

const BREATHING: &[&str] = &[
    "Keep breathing slowly.",
    "Breathe in, and out.",
    "Nice and slow.",
];

const GENERIC: &[&str] = &["Mm-hmm.", "Okay.", "I see."];

/// Which filler phrase family fits the moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillerCategory {
    Empathetic,
    Processing,
    Breathing,
    Generic,
}

impl FillerCategory {
    fn index(self) -> usize {
        match self {
            FillerCategory::Empathetic => 0,
            FillerCategory::Processing => 1,
            FillerCategory::Breathing => 2,
            FillerCategory::Generic => 3,
        }
    }

    pub fn phrases(self) -> &'static [&'static str] {
        match self {
            FillerCategory::Empathetic => EMPATHETIC,
            FillerCategory::Processing => PROCESSING,
            FillerCategory::Breathing => BREATHING,
            FillerCategory::Generic => GENERIC,
        }
    }
}

/// Which of the two filler timers fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FillerTrigger {
    Delay,
    Backstop,
}

/// Per-session filler state.
#[derive(Debug)]
pub struct FillerScheduler {
    elevated_bpm: u32,
    calm_bpm: u32,
    armed_for: Option<u64>,
    cursors: [usize; 4],
}

impl FillerScheduler {
    pub fn new(elevated_bpm: u32, calm_bpm: u32) -> Self {
        Self {
            elevated_bpm,
            calm_bpm,
            armed_for: None,
            cursors: [0; 4],
        }
    }

    pub fn from_config(config: &DialogueConfig) -> Self {
        Self::new(config.elevated_heart_rate, config.calm_heart_rate)
    }

    /// Arm for a freshly dispatched request.
    pub fn arm(&mut self, request_id: u64) {
        self.armed_for = Some(request_id);
    }

    /// Disarm. Returns the request it was armed for.
    pub fn cancel(&mut self) -> Option<u64> {
        self.armed_for.take()
    }

    pub fn armed_for(&self) -> Option<u64> {
        self.armed_for
    }

    /// Whether a timer fired for `request_id` may play a filler now.
    ///
    /// Requires the scheduler to still be armed for that request, the request
    /// to be outstanding, and no reply or critical audio on the channel.
    pub fn should_play(
        &self,
        request_id: u64,
        request_outstanding: bool,
        active: Option<Channel>,
    ) -> bool {
        self.armed_for == Some(request_id)
            && request_outstanding
            && !matches!(active, Some(Channel::Reply | Channel::Critical))
    }

    /// Category for a firing timer given the latest heart rate.
    pub fn category(&self, trigger: FillerTrigger, heart_rate: Option<u32>) -> FillerCategory {
        match (heart_rate, trigger) {
            (Some(bpm), _) if bpm >= self.elevated_bpm => FillerCategory::Empathetic,
            (_, FillerTrigger::Backstop) => FillerCategory::Processing,
            (Some(bpm), _) if bpm <= self.calm_bpm => FillerCategory::Breathing,
            _ => FillerCategory::Generic,
        }
    }

    /// Next phrase in `category`, rotating through the catalog.
    pub fn next_phrase(&mut self, category: FillerCategory) -> &'static str {
        let phrases = category.phrases();
        let cursor = &mut self.cursors[category.index()];
        let phrase = phrases[*cursor % phrases.len()];
        *cursor = cursor.wrapping_add(1);
        phrase
    }

    pub fn reset(&mut self) {
        self.armed_for = None;
        self.cursors = [0; 4];
    }
}
