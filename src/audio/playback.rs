//! Playback collaborators.
//!
//! The arbiter is the only caller. `play` resolves when the clip has finished
//! (or failed); the runtime aborts the future and calls `stop` to cut a clip
//! short.

use crate::audio::clip::{AudioClip, ClipPayload};
use crate::config::AudioConfig;
use crate::error::{GroundedError, Result};
use crate::sys;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Output device for spoken audio.
#[async_trait::async_trait]
pub trait Playback: Send + Sync {
    /// Play `clip` to completion.
    async fn play(&self, clip: &AudioClip) -> Result<()>;

    /// Stop whatever is playing. Idempotent.
    async fn stop(&self);

    fn name(&self) -> &str;
}

/// Headless playback: logs the utterance and waits its expected duration.
#[derive(Debug, Default)]
pub struct SimulatedPlayback;

#[async_trait::async_trait]
impl Playback for SimulatedPlayback {
    async fn play(&self, clip: &AudioClip) -> Result<()> {
        let duration = clip.expected_duration();
        tracing::info!(
            text = %clip.text,
            encoded = clip.is_encoded(),
            duration_ms = duration.as_millis() as u64,
            "speaking"
        );
        tokio::time::sleep(duration).await;
        Ok(())
    }

    async fn stop(&self) {}

    fn name(&self) -> &str {
        "simulated"
    }
}

/// Plays through an external command.
///
/// Speech clips pass their text as the final argument (`espeak-ng`,
/// `say`); encoded clips are piped to stdin (`mpv -`, `aplay`).
#[derive(Debug)]
pub struct CommandPlayback {
    program: String,
    args: Vec<String>,
    current_pid: Mutex<Option<u32>>,
}

impl CommandPlayback {
    /// Parse a whitespace-separated command line.
    ///
    /// # Errors
    ///
    /// Returns `GroundedError::Playback` for an empty command.
    pub fn new(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or_else(|| GroundedError::Playback {
            message: "empty player command".to_string(),
        })?;
        Ok(Self {
            program,
            args: parts.collect(),
            current_pid: Mutex::new(None),
        })
    }

    fn set_pid(&self, pid: Option<u32>) {
        *self.current_pid.lock().unwrap_or_else(|e| e.into_inner()) = pid;
    }
}

#[async_trait::async_trait]
impl Playback for CommandPlayback {
    async fn play(&self, clip: &AudioClip) -> Result<()> {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(&self.args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        match &clip.payload {
            ClipPayload::Speech => {
                command.arg(&clip.text).stdin(Stdio::null());
            }
            ClipPayload::Encoded(_) => {
                command.stdin(Stdio::piped());
            }
        }

        let mut child = command.spawn().map_err(|e| GroundedError::Playback {
            message: format!("failed to start '{}': {e}", self.program),
        })?;
        self.set_pid(child.id());

        if let ClipPayload::Encoded(bytes) = &clip.payload
            && let Some(mut stdin) = child.stdin.take()
        {
            // A player that exits early closes the pipe; that is not an error.
            if let Err(e) = stdin.write_all(bytes).await {
                tracing::debug!(error = %e, "player closed stdin");
            }
        }

        let status = child.wait().await;
        self.set_pid(None);
        let status = status.map_err(|e| GroundedError::Playback {
            message: format!("waiting for '{}': {e}", self.program),
        })?;
        if !status.success() {
            return Err(GroundedError::Playback {
                message: format!("'{}' exited with {status}", self.program),
            });
        }
        Ok(())
    }

    async fn stop(&self) {
        let pid = self
            .current_pid
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(pid) = pid
            && !sys::terminate(pid)
        {
            tracing::debug!(pid, "player already exited");
        }
    }

    fn name(&self) -> &str {
        &self.program
    }
}

/// One `play` call seen by [`RecordingPlayback`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlayedClip {
    pub text: String,
    pub encoded: bool,
}

/// Mock playback that records every clip.
///
/// Each clip "plays" for a fixed duration (or its expected duration when
/// none is set) under the tokio clock.
#[derive(Debug, Default)]
pub struct RecordingPlayback {
    duration: Option<Duration>,
    should_fail: bool,
    played: Mutex<Vec<PlayedClip>>,
    stops: Mutex<usize>,
}

impl RecordingPlayback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Play every clip for exactly `duration`.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Fail every clip immediately.
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    pub fn played(&self) -> Vec<PlayedClip> {
        self.played
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn played_texts(&self) -> Vec<String> {
        self.played().into_iter().map(|clip| clip.text).collect()
    }

    pub fn stop_count(&self) -> usize {
        *self.stops.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl Playback for RecordingPlayback {
    async fn play(&self, clip: &AudioClip) -> Result<()> {
        self.played
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(PlayedClip {
                text: clip.text.clone(),
                encoded: clip.is_encoded(),
            });
        if self.should_fail {
            return Err(GroundedError::Playback {
                message: "mock playback failure".to_string(),
            });
        }
        tokio::time::sleep(self.duration.unwrap_or_else(|| clip.expected_duration())).await;
        Ok(())
    }

    async fn stop(&self) {
        *self.stops.lock().unwrap_or_else(|e| e.into_inner()) += 1;
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Playback selected by `[audio] player_command`: the external player when
/// set, simulated otherwise.
pub fn from_config(config: &AudioConfig) -> Result<Arc<dyn Playback>> {
    match config.player_command.as_deref() {
        Some(command) if !command.trim().is_empty() => Ok(Arc::new(CommandPlayback::new(command)?)),
        _ => Ok(Arc::new(SimulatedPlayback)),
    }
}
