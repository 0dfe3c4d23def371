//! Command handler implementation for the daemon.

use crate::capture::TranscriptUpdate;
use crate::daemon::DaemonState;
use crate::ipc::protocol::{Command, Response};
use crate::ipc::server::CommandHandler;
use std::sync::Arc;

/// Maps IPC commands onto the session handle.
pub struct DaemonCommandHandler {
    state: Arc<DaemonState>,
}

impl DaemonCommandHandler {
    pub fn new(state: Arc<DaemonState>) -> Self {
        Self { state }
    }

    fn transcript(&self, text: String, is_final: bool) -> Response {
        if text.trim().is_empty() {
            return Response::error("empty transcript");
        }
        let update = TranscriptUpdate { text, is_final };
        if self.state.capture.push(update) {
            Response::Ok
        } else if self.state.capture.is_paused() {
            Response::error("capture paused while the session is speaking")
        } else {
            Response::error("no session is listening")
        }
    }
}

#[async_trait::async_trait]
impl CommandHandler for DaemonCommandHandler {
    async fn handle(&self, command: Command) -> Response {
        let session = &self.state.session;
        let result = match command {
            Command::Start => {
                if session.status().phase.is_active() {
                    return Response::error("session already running");
                }
                session.start()
            }
            Command::Stop => {
                if !session.status().phase.is_active() {
                    return Response::error("no session running");
                }
                session.stop()
            }
            Command::Status => return Response::from(session.status()),
            Command::Transcript { text, is_final } => return self.transcript(text, is_final),
            Command::HeartRate { bpm } => session.heart_rate(bpm),
            Command::Shutdown => {
                self.state.shutdown.cancel();
                Ok(())
            }
        };
        match result {
            Ok(()) => Response::Ok,
            Err(e) => Response::error(e.to_string()),
        }
    }
}
