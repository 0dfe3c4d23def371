//! Speech segmentation: decides when a transcript is complete enough to send.
//!
//! Final transcripts complete immediately; partial ones complete after a
//! silence window with no further update. Completed candidates pass a word
//! count guard and a repeat guard before they are handed on.

use crate::config::DialogueConfig;
use crate::dialogue::text::{lead_clause, word_count, word_similarity};
use std::fmt;
use std::time::{Duration, Instant};

/// Segmenter tuning.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Quiet period after a partial update before it is submitted.
    pub silence: Duration,
    pub min_words: usize,
    pub max_words: usize,
    /// Candidates more similar than this to the previous submission are dropped.
    pub similarity_threshold: f64,
    pub lead_clause_min_words: usize,
    pub max_forward_words: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self::from(&DialogueConfig::default())
    }
}

impl From<&DialogueConfig> for SegmenterConfig {
    fn from(config: &DialogueConfig) -> Self {
        Self {
            silence: Duration::from_millis(config.silence_ms),
            min_words: config.min_words,
            max_words: config.max_words,
            similarity_threshold: config.similarity_threshold,
            lead_clause_min_words: config.lead_clause_min_words,
            max_forward_words: config.max_forward_words,
        }
    }
}

/// The candidate utterance being accumulated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeechSegment {
    pub pending_text: String,
    pub last_update_at: Option<Instant>,
    pub is_final: bool,
}

impl SpeechSegment {
    pub fn is_empty(&self) -> bool {
        self.pending_text.trim().is_empty()
    }
}

/// An utterance that passed both guards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    /// Candidate as recognized; used for history and repeat detection.
    pub raw: String,
    /// Lead clause actually sent to the backend.
    pub forwarded: String,
}

/// Why a completed candidate was not submitted.
#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    Empty,
    TooShort { words: usize },
    TooLong { words: usize },
    Repeat { similarity: f64 },
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::Empty => write!(f, "empty"),
            DropReason::TooShort { words } => write!(f, "too short ({} words)", words),
            DropReason::TooLong { words } => write!(f, "too long ({} words)", words),
            DropReason::Repeat { similarity } => {
                write!(f, "repeat of previous utterance ({:.0}% overlap)", similarity * 100.0)
            }
        }
    }
}

/// Result of completing a candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Accepted(Utterance),
    /// Not fit for the backend. `candidate` is kept so the caller can still
    /// look for an end phrase in it.
    Dropped { reason: DropReason, candidate: String },
}

/// What the caller must do after feeding an update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Update thrown away (system speaking or listening disabled).
    Discarded,
    /// Candidate stored; the silence timer must be (re)armed.
    AwaitSilence,
    /// Candidate completed.
    Completed(Submission),
}

/// Accumulates transcript updates into submittable utterances.
#[derive(Debug)]
pub struct SpeechSegmenter {
    config: SegmenterConfig,
    segment: SpeechSegment,
    last_submitted: Option<String>,
}

impl SpeechSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            segment: SpeechSegment::default(),
            last_submitted: None,
        }
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    pub fn segment(&self) -> &SpeechSegment {
        &self.segment
    }

    /// Feeds one transcript update.
    ///
    /// `accepting` is false while the system speaks or listening is off;
    /// such updates are dropped outright, never buffered.
    pub fn on_update(
        &mut self,
        text: &str,
        is_final: bool,
        accepting: bool,
        now: Instant,
    ) -> UpdateOutcome {
        if !accepting {
            return UpdateOutcome::Discarded;
        }

        self.segment.pending_text = text.trim().to_string();
        self.segment.last_update_at = Some(now);
        self.segment.is_final = is_final;

        if is_final {
            UpdateOutcome::Completed(self.complete())
        } else if self.segment.is_empty() {
            UpdateOutcome::Discarded
        } else {
            UpdateOutcome::AwaitSilence
        }
    }

    /// Silence window elapsed without a newer update.
    ///
    /// Returns `None` when nothing is pending (e.g. cleared meanwhile).
    pub fn on_silence(&mut self) -> Option<Submission> {
        if self.segment.is_empty() {
            self.segment = SpeechSegment::default();
            return None;
        }
        Some(self.complete())
    }

    /// Drops the pending candidate without submitting it.
    pub fn clear(&mut self) {
        self.segment = SpeechSegment::default();
    }

    /// Forgets everything, including the repeat-guard memory.
    pub fn reset(&mut self) {
        self.segment = SpeechSegment::default();
        self.last_submitted = None;
    }

    fn complete(&mut self) -> Submission {
        let candidate = std::mem::take(&mut self.segment).pending_text;
        let submission = self.guard(&candidate);
        if let Submission::Accepted(ref utterance) = submission {
            self.last_submitted = Some(utterance.raw.clone());
        }
        submission
    }

    fn guard(&self, candidate: &str) -> Submission {
        match self.check(candidate) {
            Some(reason) => Submission::Dropped {
                reason,
                candidate: candidate.to_string(),
            },
            None => Submission::Accepted(Utterance {
                raw: candidate.to_string(),
                forwarded: lead_clause(
                    candidate,
                    self.config.lead_clause_min_words,
                    self.config.max_forward_words,
                ),
            }),
        }
    }

    fn check(&self, candidate: &str) -> Option<DropReason> {
        let words = word_count(candidate);
        if words == 0 {
            return Some(DropReason::Empty);
        }
        if words < self.config.min_words {
            return Some(DropReason::TooShort { words });
        }
        if words > self.config.max_words {
            return Some(DropReason::TooLong { words });
        }
        if let Some(previous) = &self.last_submitted {
            let similarity = word_similarity(previous, candidate);
            if similarity > self.config.similarity_threshold {
                return Some(DropReason::Repeat { similarity });
            }
        }
        None
    }
}
