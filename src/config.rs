use crate::defaults;
use crate::error::{GroundedError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub dialogue: DialogueConfig,
    pub audio: AudioConfig,
    pub detection: DetectionConfig,
}

/// Conversational backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    pub url: String,
    pub text_path: String,
    pub image_path: String,
    pub text_timeout_ms: u64,
    pub image_timeout_ms: u64,
    pub min_request_interval_ms: u64,
    pub context_turns: usize,
    pub image_update_interval_ms: u64,
}

/// Speech segmentation and session-flow configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DialogueConfig {
    pub silence_ms: u64,
    pub min_words: usize,
    pub max_words: usize,
    pub similarity_threshold: f64,
    pub lead_clause_min_words: usize,
    pub max_forward_words: usize,
    pub interrupt_min_words: usize,
    pub end_phrases: Vec<String>,
    pub inactivity_timeout_secs: u64,
    pub opening_announcement_ms: u64,
    pub elevated_heart_rate: u32,
    pub calm_heart_rate: u32,
}

/// Audio output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// External player; `None` simulates playback.
    pub player_command: Option<String>,
    /// Directory holding prerecorded announcement clips.
    pub clip_dir: Option<PathBuf>,
    pub playback_grace_ms: u64,
    pub filler_delay_ms: u64,
    pub filler_backstop_ms: u64,
    pub min_audio_bytes: usize,
}

/// Visual detection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionConfig {
    pub scanning_interval_ms: u64,
    pub interactive_interval_ms: u64,
    /// Still frame read on every capture; `None` means no camera.
    pub frame_path: Option<PathBuf>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: defaults::BACKEND_URL.to_string(),
            text_path: defaults::TEXT_ENDPOINT.to_string(),
            image_path: defaults::IMAGE_ENDPOINT.to_string(),
            text_timeout_ms: defaults::TEXT_TIMEOUT_MS,
            image_timeout_ms: defaults::IMAGE_TIMEOUT_MS,
            min_request_interval_ms: defaults::MIN_REQUEST_INTERVAL_MS,
            context_turns: defaults::CONTEXT_TURNS,
            image_update_interval_ms: defaults::IMAGE_UPDATE_INTERVAL_MS,
        }
    }
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            silence_ms: defaults::SILENCE_MS,
            min_words: defaults::MIN_WORDS,
            max_words: defaults::MAX_WORDS,
            similarity_threshold: defaults::SIMILARITY_THRESHOLD,
            lead_clause_min_words: defaults::LEAD_CLAUSE_MIN_WORDS,
            max_forward_words: defaults::MAX_FORWARD_WORDS,
            interrupt_min_words: defaults::INTERRUPT_MIN_WORDS,
            end_phrases: defaults::END_PHRASES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            inactivity_timeout_secs: defaults::INACTIVITY_TIMEOUT_SECS,
            opening_announcement_ms: defaults::OPENING_ANNOUNCEMENT_MS,
            elevated_heart_rate: defaults::ELEVATED_HEART_RATE,
            calm_heart_rate: defaults::CALM_HEART_RATE,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            player_command: None,
            clip_dir: None,
            playback_grace_ms: defaults::PLAYBACK_GRACE_MS,
            filler_delay_ms: defaults::FILLER_DELAY_MS,
            filler_backstop_ms: defaults::FILLER_BACKSTOP_MS,
            min_audio_bytes: defaults::MIN_AUDIO_BYTES,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            scanning_interval_ms: defaults::DETECTION_SCANNING_MS,
            interactive_interval_ms: defaults::DETECTION_INTERACTIVE_MS,
            frame_path: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Other failures (invalid TOML, unreadable file) are returned as errors.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - GROUNDED_BACKEND_URL → backend.url
    /// - GROUNDED_PLAYER → audio.player_command
    /// - GROUNDED_FRAME_PATH → detection.frame_path
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("GROUNDED_BACKEND_URL")
            && !url.is_empty()
        {
            self.backend.url = url;
        }

        if let Ok(player) = std::env::var("GROUNDED_PLAYER")
            && !player.is_empty()
        {
            self.audio.player_command = Some(player);
        }

        if let Ok(frame) = std::env::var("GROUNDED_FRAME_PATH")
            && !frame.is_empty()
        {
            self.detection.frame_path = Some(PathBuf::from(frame));
        }

        self
    }

    /// Reject values the session cannot run with.
    pub fn validate(&self) -> Result<()> {
        let d = &self.dialogue;
        if d.min_words == 0 || d.min_words > d.max_words {
            return Err(invalid(
                "dialogue.min_words",
                "must be at least 1 and not exceed dialogue.max_words",
            ));
        }
        if !(0.0..=1.0).contains(&d.similarity_threshold) {
            return Err(invalid(
                "dialogue.similarity_threshold",
                "must be between 0.0 and 1.0",
            ));
        }
        if d.silence_ms == 0 {
            return Err(invalid("dialogue.silence_ms", "must be positive"));
        }
        if d.calm_heart_rate >= d.elevated_heart_rate {
            return Err(invalid(
                "dialogue.calm_heart_rate",
                "must be below dialogue.elevated_heart_rate",
            ));
        }
        if self.backend.context_turns > defaults::CONTEXT_TURNS {
            return Err(invalid(
                "backend.context_turns",
                &format!("at most {} turns are sent", defaults::CONTEXT_TURNS),
            ));
        }
        for (key, value) in [
            ("backend.image_update_interval_ms", self.backend.image_update_interval_ms),
            ("backend.text_timeout_ms", self.backend.text_timeout_ms),
            ("backend.image_timeout_ms", self.backend.image_timeout_ms),
            ("detection.scanning_interval_ms", self.detection.scanning_interval_ms),
            ("detection.interactive_interval_ms", self.detection.interactive_interval_ms),
        ] {
            if value == 0 {
                return Err(invalid(key, "must be positive"));
            }
        }
        if self.audio.filler_backstop_ms < self.audio.filler_delay_ms {
            return Err(invalid(
                "audio.filler_backstop_ms",
                "must not be shorter than audio.filler_delay_ms",
            ));
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/grounded/config.toml on Linux
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("grounded").join("config.toml"))
            .ok_or_else(|| GroundedError::Other("Could not determine config directory".into()))
    }
}

fn invalid(key: &str, message: &str) -> GroundedError {
    GroundedError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
