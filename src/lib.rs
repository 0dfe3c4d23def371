//! grounded - turn-taking dialogue orchestrator for voice-driven grounding
//! sessions.
//!
//! A single coordinator owns all session state and reacts to transcript
//! updates, backend replies, playback completions and timers. Everything that
//! talks to the outside world (recognizer, camera, backend, speaker) is a
//! collaborator behind a trait.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod capture;
#[cfg(feature = "cli")]
pub mod cli;
pub mod clock;
pub mod config;
#[cfg(feature = "http-backend")]
pub mod daemon;
pub mod defaults;
pub mod detection;
pub mod diagnostics;
pub mod dialogue;
pub mod dispatch;
pub mod error;
pub mod filler;
pub mod ipc;
pub mod logging;
pub mod orchestrator;
pub mod session;
pub mod sys;

// Composition root for the interactive binary mode
#[cfg(all(feature = "cli", feature = "http-backend"))]
pub mod app;

// Collaborator traits
pub use audio::Playback;
pub use capture::CaptureSource;
pub use clock::Clock;
pub use dispatch::Backend;

// Coordinator
pub use orchestrator::{Orchestrator, SessionHandle, SessionNotice, SessionRuntime, SessionStatus};

// Error handling
pub use error::{DialogueFailure, GroundedError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_hash_suffix() {
        let ver = version_string();
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            let hash_part = ver.split('+').nth(1).unwrap_or("");
            assert_eq!(hash_part.len(), 7, "Git hash should be 7 chars, got: {}", ver);
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
