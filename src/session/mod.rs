//! Per-episode session state.
//!
//! A [`Session`] exists from the start command until the closing
//! announcement finishes; it is owned by the orchestrator and never outlives
//! one episode.

pub mod history;
pub mod phase;

pub use history::{ContextTurn, ConversationHistory, ConversationTurn};
pub use phase::{EndReason, Phase};

use std::time::Instant;

/// State of one crisis-intervention episode.
#[derive(Debug, Clone)]
pub struct Session {
    pub phase: Phase,
    pub started_at: Instant,
    pub history: ConversationHistory,
    pub last_response_at: Option<Instant>,
    /// When continuous dialogue began; inactivity counts from here until the first reply.
    pub dialogue_started_at: Option<Instant>,
    /// Latest heart rate reported by the wearable, if any.
    pub heart_rate: Option<u32>,
}

impl Session {
    /// Creates a session that has just left `Idle`.
    pub fn begin(now: Instant) -> Self {
        Self {
            phase: Phase::Initializing,
            started_at: now,
            history: ConversationHistory::new(),
            last_response_at: None,
            dialogue_started_at: None,
            heart_rate: None,
        }
    }

    /// Time since the last agent reply (or since dialogue began).
    pub fn silent_for(&self, now: Instant) -> Option<std::time::Duration> {
        self.last_response_at
            .or(self.dialogue_started_at)
            .map(|since| now.saturating_duration_since(since))
    }
}
