//! Error types for grounded.
//!
//! Two layers: [`GroundedError`] is what setup, configuration, IPC and the
//! collaborators return through `?`. [`DialogueFailure`] is the in-session
//! failure taxonomy; it travels through the coordinator's event stream as a
//! value and is always absorbed there (fallback phrase, or nothing this cycle).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GroundedError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Backend errors
    #[error("Backend request failed: {message}")]
    Backend { message: String },

    // Audio output errors
    #[error("Playback failed: {message}")]
    Playback { message: String },

    // Capture errors
    #[error("Capture unavailable: {message}")]
    CaptureUnavailable { message: String },

    // Session control errors
    #[error("Session runtime is not running")]
    SessionClosed,

    // IPC errors
    #[error("IPC socket error: {message}")]
    IpcSocket { message: String },

    #[error("IPC protocol error: {message}")]
    IpcProtocol { message: String },

    #[error("IPC connection failed: {message}")]
    IpcConnection { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, GroundedError>;

/// Failures that can happen inside a running session.
///
/// None of these is fatal. Conversational failures make the session speak
/// the fallback phrase; capture and contention failures skip the cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DialogueFailure {
    /// Timeout or unreachable backend.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// Backend answered without usable content (empty, `null`, no reply field).
    #[error("backend returned no usable content")]
    EmptyOrNullResponse,

    /// Malformed payload or audio.
    #[error("decode failure: {0}")]
    DecodeFailure(String),

    /// Camera or microphone not ready.
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// Audio channel requested while a higher-priority channel is active.
    #[error("audio channel busy: {0}")]
    ResourceContention(String),
}

impl DialogueFailure {
    /// Whether the user should hear the fallback phrase for this failure.
    ///
    /// Only conversational request failures qualify.
    pub fn warrants_fallback(&self) -> bool {
        matches!(
            self,
            DialogueFailure::NetworkFailure(_)
                | DialogueFailure::EmptyOrNullResponse
                | DialogueFailure::DecodeFailure(_)
        )
    }
}

impl From<GroundedError> for DialogueFailure {
    fn from(err: GroundedError) -> Self {
        match err {
            GroundedError::CaptureUnavailable { message } => {
                DialogueFailure::CaptureUnavailable(message)
            }
            GroundedError::Playback { message } => DialogueFailure::DecodeFailure(message),
            other => DialogueFailure::NetworkFailure(other.to_string()),
        }
    }
}
