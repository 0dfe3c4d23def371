//! Async Unix socket IPC server for daemon control.

use crate::error::{GroundedError, Result};
use crate::ipc::protocol::{Command, Response};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

/// Handler trait for processing IPC commands.
#[async_trait::async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, command: Command) -> Response;
}

/// IPC server for daemon control commands over a Unix socket.
pub struct IpcServer {
    socket_path: PathBuf,
    shutdown: CancellationToken,
}

impl IpcServer {
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Default socket path based on XDG_RUNTIME_DIR, with a per-user fallback.
    pub fn default_socket_path() -> PathBuf {
        match std::env::var("XDG_RUNTIME_DIR") {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir).join("grounded.sock"),
            _ => PathBuf::from(format!("/tmp/grounded-{}.sock", crate::sys::current_uid())),
        }
    }

    /// Accept connections until [`stop`](Self::stop) is called.
    pub async fn start<H>(&self, handler: H) -> Result<()>
    where
        H: CommandHandler + 'static,
    {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| GroundedError::IpcSocket {
                message: format!("Failed to remove existing socket: {}", e),
            })?;
        }

        let listener =
            UnixListener::bind(&self.socket_path).map_err(|e| GroundedError::IpcSocket {
                message: format!("Failed to bind to socket: {}", e),
            })?;
        tracing::info!(socket = %self.socket_path.display(), "IPC server listening");

        let handler = Arc::new(handler);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let handler = Arc::clone(&handler);
                        tokio::spawn(async move {
                            if let Err(e) = handle_client(stream, handler).await {
                                tracing::warn!(error = %e, "IPC client failed");
                            }
                        });
                    }
                    Err(e) => {
                        return Err(GroundedError::IpcConnection {
                            message: format!("Failed to accept connection: {}", e),
                        });
                    }
                },
            }
        }

        Ok(())
    }

    /// Stop accepting connections and remove the socket file.
    pub fn stop(&self) -> Result<()> {
        self.shutdown.cancel();

        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| GroundedError::IpcSocket {
                message: format!("Failed to remove socket file: {}", e),
            })?;
        }

        Ok(())
    }
}

/// Serve one request line on `stream`.
async fn handle_client<H>(stream: UnixStream, handler: Arc<H>) -> Result<()>
where
    H: CommandHandler + ?Sized,
{
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    reader
        .read_line(&mut line)
        .await
        .map_err(|e| GroundedError::IpcConnection {
            message: format!("Failed to read from client: {}", e),
        })?;

    // Malformed commands get an error response instead of a dropped connection.
    let response = match Command::from_json(line.trim()) {
        Ok(command) => {
            tracing::debug!(?command, "IPC command");
            handler.handle(command).await
        }
        Err(e) => Response::error(format!("Failed to parse command: {}", e)),
    };

    let mut response_json = response.to_json().map_err(|e| GroundedError::IpcProtocol {
        message: format!("Failed to serialize response: {}", e),
    })?;
    response_json.push('\n');

    writer
        .write_all(response_json.as_bytes())
        .await
        .map_err(|e| GroundedError::IpcConnection {
            message: format!("Failed to write to client: {}", e),
        })?;
    writer
        .flush()
        .await
        .map_err(|e| GroundedError::IpcConnection {
            message: format!("Failed to flush writer: {}", e),
        })?;

    Ok(())
}
