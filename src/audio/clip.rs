//! Audio clips and the prerecorded announcement library.

use crate::defaults;
use crate::dialogue::text::word_count;
use crate::error::DialogueFailure;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// What the playback collaborator is asked to render.
#[derive(Debug, Clone, PartialEq)]
pub enum ClipPayload {
    /// Speak `AudioClip::text`.
    Speech,
    /// Play encoded audio (WAV, MP3, ...).
    Encoded(Arc<Vec<u8>>),
}

/// One utterance for the output channel. The text is always present so a
/// clip can fall back to speech when its audio is unusable.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub text: String,
    pub payload: ClipPayload,
    /// Source reference, recorded in history (`intro_calm.mp3`, `backend`).
    pub source: Option<String>,
}

impl AudioClip {
    pub fn speech(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            payload: ClipPayload::Speech,
            source: None,
        }
    }

    /// Build a clip from a backend reply, rejecting truncated audio.
    ///
    /// Audio shorter than `min_bytes` is dropped before any decode is
    /// attempted and the clip speaks its text instead.
    pub fn from_reply(text: &str, audio: Option<Vec<u8>>, min_bytes: usize) -> Self {
        match audio {
            Some(bytes) => match check_payload(&bytes, min_bytes) {
                Ok(()) => Self {
                    text: text.to_string(),
                    payload: ClipPayload::Encoded(Arc::new(bytes)),
                    source: Some("backend".to_string()),
                },
                Err(failure) => {
                    tracing::warn!(%failure, "reply audio rejected, speaking text");
                    Self::speech(text)
                }
            },
            None => Self::speech(text),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn is_encoded(&self) -> bool {
        matches!(self.payload, ClipPayload::Encoded(_))
    }

    /// How long playback should take. Used for simulated playback and for the
    /// completion safety net.
    pub fn expected_duration(&self) -> Duration {
        match &self.payload {
            ClipPayload::Encoded(bytes) => encoded_duration(bytes),
            ClipPayload::Speech => speech_duration(&self.text),
        }
    }
}

/// Minimum-size sanity check applied before decode.
pub fn check_payload(bytes: &[u8], min_bytes: usize) -> Result<(), DialogueFailure> {
    if bytes.len() < min_bytes {
        return Err(DialogueFailure::DecodeFailure(format!(
            "audio payload too small ({} < {} bytes)",
            bytes.len(),
            min_bytes
        )));
    }
    Ok(())
}

/// Estimated time to speak `text`.
pub fn speech_duration(text: &str) -> Duration {
    let words = word_count(text).max(1) as f64;
    Duration::from_secs_f64(words / defaults::WORDS_PER_SECOND)
}

/// Duration of encoded audio: exact for WAV, estimated from size otherwise.
pub fn encoded_duration(bytes: &[u8]) -> Duration {
    if let Ok(reader) = hound::WavReader::new(Cursor::new(bytes)) {
        let rate = reader.spec().sample_rate;
        if rate > 0 {
            return Duration::from_secs_f64(reader.duration() as f64 / rate as f64);
        }
    }
    Duration::from_secs_f64(bytes.len() as f64 / defaults::ENCODED_BYTES_PER_SECOND as f64)
}

/// Opening, closing and fallback clips.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipLibrary {
    pub opening: AudioClip,
    pub closing: AudioClip,
    pub fallback: AudioClip,
}

impl Default for ClipLibrary {
    fn default() -> Self {
        Self {
            opening: AudioClip::speech(defaults::OPENING_TEXT),
            closing: AudioClip::speech(defaults::CLOSING_TEXT),
            fallback: AudioClip::speech(defaults::FALLBACK_TEXT),
        }
    }
}

impl ClipLibrary {
    /// Load prerecorded clips from `dir`. Missing or undersized files fall
    /// back to speaking the fixed text.
    pub fn load(dir: Option<&Path>, min_bytes: usize) -> Self {
        let Some(dir) = dir else {
            return Self::default();
        };
        Self {
            opening: load_clip(dir, defaults::OPENING_CLIP, defaults::OPENING_TEXT, min_bytes),
            closing: load_clip(dir, defaults::CLOSING_CLIP, defaults::CLOSING_TEXT, min_bytes),
            fallback: load_clip(dir, defaults::FALLBACK_CLIP, defaults::FALLBACK_TEXT, min_bytes),
        }
    }
}

fn load_clip(dir: &Path, name: &str, text: &str, min_bytes: usize) -> AudioClip {
    let path = dir.join(name);
    match std::fs::read(&path) {
        Ok(bytes) => match check_payload(&bytes, min_bytes) {
            Ok(()) => AudioClip {
                text: text.to_string(),
                payload: ClipPayload::Encoded(Arc::new(bytes)),
                source: Some(name.to_string()),
            },
            Err(failure) => {
                tracing::warn!(path = %path.display(), %failure, "clip rejected");
                AudioClip::speech(text).with_source(name)
            }
        },
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "clip not loaded");
            AudioClip::speech(text).with_source(name)
        }
    }
}
