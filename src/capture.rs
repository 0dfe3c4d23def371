//! Capture collaborator: transcript stream and still frames.
//!
//! Speech recognition and camera handling live outside this crate. A
//! [`CaptureSource`] is handed to the session runtime at start and is the only
//! path by which user speech and frames enter the orchestrator.

use crate::error::{GroundedError, Result};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// One recognizer update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptUpdate {
    pub text: String,
    pub is_final: bool,
}

impl TranscriptUpdate {
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// Microphone/camera capability injected into a session.
#[async_trait::async_trait]
pub trait CaptureSource: Send + Sync {
    /// Start delivering transcript updates to `sink`. Replaces any previous
    /// stream.
    fn start_transcript_stream(&self, sink: mpsc::UnboundedSender<TranscriptUpdate>)
    -> Result<()>;

    /// Stop delivering transcript updates.
    fn stop_transcript_stream(&self);

    /// Stop listening (the microphone hears our own output).
    fn pause(&self);

    fn resume(&self);

    /// Grab one encoded still frame.
    ///
    /// # Errors
    ///
    /// Returns `GroundedError::CaptureUnavailable` when no camera frame can be
    /// produced.
    async fn capture_still_frame(&self) -> Result<Vec<u8>>;
}

/// Capture source fed from outside the process.
///
/// Transcript text is pushed in (from stdin, the IPC socket or tests); still
/// frames are read from a file refreshed by an external camera process, or
/// served from a fixed buffer.
#[derive(Debug, Default)]
pub struct ChannelCapture {
    sink: Mutex<Option<mpsc::UnboundedSender<TranscriptUpdate>>>,
    paused: AtomicBool,
    frame_path: Option<PathBuf>,
    frame: Option<Vec<u8>>,
}

impl ChannelCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read still frames from `path` on every capture.
    pub fn with_frame_path(mut self, path: Option<PathBuf>) -> Self {
        self.frame_path = path;
        self
    }

    /// Serve a fixed frame.
    pub fn with_frame(mut self, frame: Vec<u8>) -> Self {
        self.frame = Some(frame);
        self
    }

    /// Deliver an update. Returns `false` when it was dropped because the
    /// source is paused or no stream is running.
    pub fn push(&self, update: TranscriptUpdate) -> bool {
        if self.paused.load(Ordering::SeqCst) {
            tracing::trace!(text = %update.text, "capture paused, update dropped");
            return false;
        }
        let sink = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        match sink.as_ref() {
            Some(sink) => sink.send(update).is_ok(),
            None => false,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_streaming(&self) -> bool {
        self.sink
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|sink| !sink.is_closed())
    }
}

#[async_trait::async_trait]
impl CaptureSource for ChannelCapture {
    fn start_transcript_stream(
        &self,
        sink: mpsc::UnboundedSender<TranscriptUpdate>,
    ) -> Result<()> {
        *self.sink.lock().unwrap_or_else(|e| e.into_inner()) = Some(sink);
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stop_transcript_stream(&self) {
        self.sink.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    async fn capture_still_frame(&self) -> Result<Vec<u8>> {
        if let Some(frame) = &self.frame {
            return Ok(frame.clone());
        }
        let path = self
            .frame_path
            .as_ref()
            .ok_or_else(|| GroundedError::CaptureUnavailable {
                message: "no camera configured".to_string(),
            })?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| GroundedError::CaptureUnavailable {
                message: format!("{}: {e}", path.display()),
            })?;
        if bytes.is_empty() {
            return Err(GroundedError::CaptureUnavailable {
                message: format!("{} is empty", path.display()),
            });
        }
        Ok(bytes)
    }
}
