//! Session phase state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse stage of a session; decides which background loops run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Initializing,
    Stabilizing,
    ContinuousDialogue,
    Ending,
}

/// Why a session moved to [`Phase::Ending`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum EndReason {
    /// Explicit stop command.
    Stopped,
    /// User said one of the end-of-crisis phrases.
    EndPhrase { phrase: String },
    /// No agent reply for longer than the inactivity ceiling.
    Inactivity,
}

impl Phase {
    /// Whether `self → next` is a legal transition.
    ///
    /// Stop can end a session from any active phase, so `Ending` is reachable
    /// from every phase except `Idle` and `Ending` itself.
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Idle, Initializing)
                | (Initializing, Stabilizing)
                | (Stabilizing, ContinuousDialogue)
                | (Initializing | Stabilizing | ContinuousDialogue, Ending)
                | (Ending, Idle)
        )
    }

    /// Phases in which user speech is listened to.
    pub fn accepts_speech(self) -> bool {
        matches!(self, Phase::Stabilizing | Phase::ContinuousDialogue)
    }

    /// Phases in which camera frames and detection cycles run.
    pub fn runs_visual_loops(self) -> bool {
        matches!(self, Phase::Stabilizing | Phase::ContinuousDialogue)
    }

    /// Phases that belong to a live session.
    pub fn is_active(self) -> bool {
        !matches!(self, Phase::Idle)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Initializing => "initializing",
            Phase::Stabilizing => "stabilizing",
            Phase::ContinuousDialogue => "continuous_dialogue",
            Phase::Ending => "ending",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::Stopped => write!(f, "stopped"),
            EndReason::EndPhrase { phrase } => write!(f, "end phrase \"{}\"", phrase),
            EndReason::Inactivity => write!(f, "inactivity"),
        }
    }
}
