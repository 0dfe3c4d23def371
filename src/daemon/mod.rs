//! Daemon mode: a long-lived session runtime behind the IPC socket.

pub mod handler;

use crate::audio::playback;
use crate::capture::ChannelCapture;
use crate::config::Config;
use crate::dispatch::HttpBackend;
use crate::error::{GroundedError, Result};
use crate::ipc::IpcServer;
use crate::orchestrator::{Collaborators, SessionHandle, SessionNotice, SessionRuntime};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Everything the command handler needs to drive the session.
pub struct DaemonState {
    pub session: SessionHandle,
    /// Transcript updates pushed over IPC enter the session here.
    pub capture: Arc<ChannelCapture>,
    /// Cancelled by the `shutdown` command.
    pub shutdown: CancellationToken,
}

impl DaemonState {
    pub fn new(session: SessionHandle, capture: Arc<ChannelCapture>) -> Self {
        Self {
            session,
            capture,
            shutdown: CancellationToken::new(),
        }
    }
}

/// Run the daemon until SIGINT, SIGTERM or an IPC `shutdown` command.
pub async fn run_daemon(config: Config, socket_path: Option<PathBuf>) -> Result<()> {
    let capture = Arc::new(
        ChannelCapture::new().with_frame_path(config.detection.frame_path.clone()),
    );
    let collaborators = Collaborators {
        backend: Arc::new(HttpBackend::new(&config.backend)),
        playback: playback::from_config(&config.audio)?,
        capture: capture.clone(),
    };
    tracing::info!(
        backend = %config.backend.url,
        playback = collaborators.playback.name(),
        "starting daemon"
    );

    let session = SessionRuntime::from_config(&config, collaborators);
    let notices = tokio::spawn(log_notices(session.subscribe()));
    let state = Arc::new(DaemonState::new(session, capture));
    let shutdown = state.shutdown.clone();

    let socket_path = socket_path.unwrap_or_else(IpcServer::default_socket_path);
    let server = Arc::new(IpcServer::new(socket_path));
    let handler = handler::DaemonCommandHandler::new(Arc::clone(&state));
    let running = Arc::clone(&server);
    let server_task = tokio::spawn(async move { running.start(handler).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT, shutting down"),
        res = wait_for_sigterm() => {
            if let Err(e) = res {
                tracing::error!(error = %e, "signal handler setup failed");
            }
            tracing::info!("received SIGTERM, shutting down");
        }
        _ = shutdown.cancelled() => tracing::info!("shutdown requested over IPC"),
    }

    server.stop()?;
    match server_task.await {
        Ok(Err(e)) => tracing::error!(error = %e, "IPC server failed"),
        Err(e) => tracing::error!(error = %e, "IPC server task failed"),
        Ok(Ok(())) => {}
    }

    match Arc::try_unwrap(state) {
        Ok(state) => state.session.shutdown().await,
        // A client task still holds the state; dropping the handle cancels it.
        Err(_) => tracing::debug!("session state still shared at shutdown"),
    }
    notices.abort();
    tracing::info!("daemon stopped");
    Ok(())
}

/// Mirror session notices into the log, one JSON object per notice.
pub async fn log_notices(mut notices: broadcast::Receiver<SessionNotice>) {
    loop {
        match notices.recv().await {
            Ok(notice) => match serde_json::to_string(&notice) {
                Ok(json) => tracing::info!(target: "grounded::notice", "{json}"),
                Err(e) => tracing::warn!(error = %e, "unserializable notice"),
            },
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "notice log fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Wait for SIGTERM (sent by systemd).
#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| GroundedError::Other(format!("Failed to register SIGTERM handler: {}", e)))?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    std::future::pending::<()>().await
}
