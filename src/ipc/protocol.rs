//! JSON-lines protocol between the CLI client and the daemon.

use crate::orchestrator::SessionStatus;
use crate::session::Phase;
use serde::{Deserialize, Serialize};

/// Commands sent by the CLI (or an external recognizer) to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Begin a session
    Start,
    /// End the running session
    Stop,
    /// Get session status
    Status,
    /// Recognizer update for the capture collaborator
    Transcript {
        text: String,
        #[serde(default = "default_is_final")]
        is_final: bool,
    },
    /// Latest heart-rate sample
    HeartRate { bpm: u32 },
    /// Shutdown the daemon
    Shutdown,
}

fn default_is_final() -> bool {
    true
}

impl Command {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Responses sent by the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Ok,
    Status {
        phase: Phase,
        channel: Option<String>,
        turns: usize,
        heart_rate: Option<u32>,
    },
    Error { message: String },
}

impl Response {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }
}

impl From<SessionStatus> for Response {
    fn from(status: SessionStatus) -> Self {
        Response::Status {
            phase: status.phase,
            channel: status.channel.map(|c| c.as_str().to_string()),
            turns: status.turns,
            heart_rate: status.heart_rate,
        }
    }
}
