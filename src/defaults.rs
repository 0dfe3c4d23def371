//! Default configuration constants for grounded.
//!
//! Shared by the config layer and the components so every default lives in
//! one place.

/// Default backend base URL.
pub const BACKEND_URL: &str = "http://localhost:8000";

/// Path of the conversational text endpoint.
pub const TEXT_ENDPOINT: &str = "/chat";

/// Path of the image endpoint.
pub const IMAGE_ENDPOINT: &str = "/upload_image";

/// Per-request timeout for conversational text requests, in milliseconds.
///
/// The backend targets replies under 2s; this is the hard bound.
pub const TEXT_TIMEOUT_MS: u64 = 10_000;

/// Per-request timeout for image requests, in milliseconds.
pub const IMAGE_TIMEOUT_MS: u64 = 3_000;

/// Minimum spacing between two conversational dispatches, in milliseconds.
pub const MIN_REQUEST_INTERVAL_MS: u64 = 1_000;

/// Number of recent turns attached to a text request as context.
pub const CONTEXT_TURNS: usize = 3;

/// Period of the conversational camera-frame updates, in milliseconds.
pub const IMAGE_UPDATE_INTERVAL_MS: u64 = 5_000;

/// Silence window after a partial transcript before it is submitted.
pub const SILENCE_MS: u64 = 2_000;

/// Shortest utterance (in words) worth sending.
pub const MIN_WORDS: usize = 3;

/// Longest utterance (in words) worth sending.
pub const MAX_WORDS: usize = 200;

/// Word-overlap ratio above which an utterance counts as a repeat.
pub const SIMILARITY_THRESHOLD: f64 = 0.8;

/// A leading sentence is forwarded on its own once it has this many words.
pub const LEAD_CLAUSE_MIN_WORDS: usize = 5;

/// Word cap applied when no leading sentence qualifies.
pub const MAX_FORWARD_WORDS: usize = 50;

/// A final transcript needs this many words to interrupt a spoken reply.
pub const INTERRUPT_MIN_WORDS: usize = 4;

/// Overlap with the text being spoken at which a transcript is our own echo.
pub const ECHO_SIMILARITY: f64 = 0.5;

/// Inactivity ceiling: no agent reply for this long ends the session.
pub const INACTIVITY_TIMEOUT_SECS: u64 = 300;

/// Fixed duration of the opening announcement.
pub const OPENING_ANNOUNCEMENT_MS: u64 = 8_000;

/// Heart rate at or above which the user is treated as agitated.
pub const ELEVATED_HEART_RATE: u32 = 100;

/// Heart rate at or below which the user is treated as calm.
pub const CALM_HEART_RATE: u32 = 70;

/// Safety margin added to a clip's expected duration before the watchdog fires.
pub const PLAYBACK_GRACE_MS: u64 = 2_000;

/// Delay after dispatch before a thinking filler may play.
pub const FILLER_DELAY_MS: u64 = 1_500;

/// Second filler chance for slow responses.
pub const FILLER_BACKSTOP_MS: u64 = 3_000;

/// Encoded audio payloads smaller than this are treated as truncated.
pub const MIN_AUDIO_BYTES: usize = 1_024;

/// Detection interval while scanning for objects.
pub const DETECTION_SCANNING_MS: u64 = 1_000;

/// Detection interval once interactive visualization is on.
pub const DETECTION_INTERACTIVE_MS: u64 = 3_000;

/// Speaking rate used to estimate how long spoken text takes.
pub const WORDS_PER_SECOND: f64 = 2.5;

/// Bitrate assumed for encoded non-WAV payloads (128 kbit/s).
pub const ENCODED_BYTES_PER_SECOND: u64 = 16_000;

/// Opening announcement.
pub const OPENING_TEXT: &str = "Hello. I am here for you. Take a slow, deep breath. We are starting the grounding protocol now.";

/// Closing announcement.
pub const CLOSING_TEXT: &str =
    "You're doing great. The crisis intervention is complete. Take care of yourself.";

/// Spoken when a conversational request fails.
pub const FALLBACK_TEXT: &str = "Take a deep breath. Look around you and find five things you can see. Name them out loud. You're safe, and this feeling will pass.";

/// Prerecorded clip file names inside `audio.clip_dir`.
pub const OPENING_CLIP: &str = "intro_calm.mp3";
pub const CLOSING_CLIP: &str = "end_calm.mp3";
pub const FALLBACK_CLIP: &str = "fallback_calm.mp3";

/// Phrases that signal the crisis is over.
pub const END_PHRASES: &[&str] = &[
    "i'm better",
    "i am better",
    "i feel better",
    "i feel okay",
    "i feel ok",
    "i'm okay now",
    "i am okay now",
    "i'm fine now",
    "i feel calm now",
];
