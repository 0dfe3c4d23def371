//! Interactive session on stdin.
//!
//! Each stdin line is a final transcript; a line starting with `~` is a
//! partial update. EOF or Ctrl-C ends the session, and the process exits once
//! the closing announcement has finished.

use crate::audio::{Channel, playback};
use crate::capture::{ChannelCapture, TranscriptUpdate};
use crate::config::Config;
use crate::dispatch::HttpBackend;
use crate::error::Result;
use crate::orchestrator::{Collaborators, SessionNotice, SessionRuntime};
use owo_colors::OwoColorize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

/// Upper bound on waiting for the closing announcement after a stop.
const CLOSING_WAIT: Duration = Duration::from_secs(30);

/// Command-line overrides applied on top of file and environment config.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub backend: Option<String>,
    pub player: Option<String>,
    pub inactivity_secs: Option<u64>,
}

impl Overrides {
    pub fn apply(self, mut config: Config) -> Config {
        if let Some(url) = self.backend {
            config.backend.url = url;
        }
        if let Some(player) = self.player {
            config.audio.player_command = Some(player);
        }
        if let Some(secs) = self.inactivity_secs {
            config.dialogue.inactivity_timeout_secs = secs;
        }
        config
    }
}

/// Turn one stdin line into a transcript update.
pub fn parse_line(line: &str) -> Option<TranscriptUpdate> {
    let line = line.trim();
    match line.strip_prefix('~') {
        Some(partial) if !partial.trim().is_empty() => {
            Some(TranscriptUpdate::partial(partial.trim()))
        }
        Some(_) => None,
        None if line.is_empty() => None,
        None => Some(TranscriptUpdate::final_text(line)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tone {
    Agent(Channel),
    User,
    Muted,
    Warning,
    Done,
}

/// One-line rendering of a notice for the terminal, if it is worth showing.
fn describe(notice: &SessionNotice) -> Option<(Tone, String)> {
    match notice {
        SessionNotice::PhaseChanged { from, to } => {
            Some((Tone::Muted, format!("phase {} -> {}", from, to)))
        }
        SessionNotice::PlaybackStarted { channel, text } => {
            Some((Tone::Agent(*channel), format!("[{}] {}", channel, text)))
        }
        SessionNotice::UtteranceSubmitted { text, .. } => Some((Tone::User, format!("you: {}", text))),
        SessionNotice::Fallback { failure } => {
            Some((Tone::Warning, format!("backend failed ({})", failure)))
        }
        SessionNotice::ObjectsDetected { labels } if !labels.is_empty() => {
            Some((Tone::Muted, format!("seeing: {}", labels.join(", "))))
        }
        SessionNotice::Advisory { text } => Some((Tone::Muted, format!("advisory: {}", text))),
        SessionNotice::SessionEnded { reason, turns } => Some((
            Tone::Done,
            format!("session ended ({}), {} turns", reason, turns),
        )),
        _ => None,
    }
}

fn print_notice(notice: &SessionNotice) {
    let Some((tone, line)) = describe(notice) else {
        tracing::debug!(?notice, "notice");
        return;
    };
    match tone {
        Tone::Agent(Channel::Critical) => eprintln!("{}", line.magenta()),
        Tone::Agent(Channel::Reply) => eprintln!("{}", line.cyan()),
        Tone::Agent(Channel::Filler) => eprintln!("{}", line.yellow().dimmed()),
        Tone::User => eprintln!("{}", line.bold()),
        Tone::Muted => eprintln!("{}", line.dimmed()),
        Tone::Warning => eprintln!("{}", line.yellow()),
        Tone::Done => eprintln!("{}", line.green()),
    }
}

/// Run one session fed from stdin.
pub async fn run_interactive(config: Config, quiet: bool) -> Result<()> {
    config.validate()?;
    let capture = Arc::new(
        ChannelCapture::new().with_frame_path(config.detection.frame_path.clone()),
    );
    let collaborators = Collaborators {
        backend: Arc::new(HttpBackend::new(&config.backend)),
        playback: playback::from_config(&config.audio)?,
        capture: capture.clone(),
    };
    let session = SessionRuntime::from_config(&config, collaborators);
    let mut notices = session.subscribe();
    session.start()?;
    if !quiet {
        eprintln!(
            "{}",
            "Session started. Type what the user says; prefix partial updates with '~'. Ctrl-D ends."
                .dimmed()
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut reading = true;
    let mut stop_deadline: Option<tokio::time::Instant> = None;

    loop {
        let deadline = stop_deadline.unwrap_or_else(tokio::time::Instant::now);
        tokio::select! {
            notice = notices.recv() => match notice {
                Ok(notice) => {
                    let ended = matches!(notice, SessionNotice::SessionEnded { .. });
                    if !quiet {
                        print_notice(&notice);
                    }
                    if ended {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "notice stream lagged"),
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line(), if reading => match line {
                Ok(Some(line)) => {
                    if let Some(update) = parse_line(&line)
                        && !capture.push(update)
                    {
                        tracing::debug!("update dropped, session is not listening");
                    }
                }
                Ok(None) => {
                    reading = false;
                    stop_deadline = Some(tokio::time::Instant::now() + CLOSING_WAIT);
                    session.stop()?;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    reading = false;
                    stop_deadline = Some(tokio::time::Instant::now() + CLOSING_WAIT);
                    session.stop()?;
                }
            },
            _ = tokio::signal::ctrl_c(), if stop_deadline.is_none() => {
                reading = false;
                stop_deadline = Some(tokio::time::Instant::now() + CLOSING_WAIT);
                session.stop()?;
            }
            _ = tokio::time::sleep_until(deadline), if stop_deadline.is_some() => {
                tracing::warn!("closing announcement did not finish in time");
                break;
            }
        }
    }

    session.shutdown().await;
    Ok(())
}
