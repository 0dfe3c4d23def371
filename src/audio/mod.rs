//! Spoken output: channel arbitration, clips and playback collaborators.

pub mod arbiter;
pub mod clip;
pub mod playback;

pub use arbiter::{ActivePlayback, Admission, AudioArbiter, Channel, QueuedReply};
pub use clip::{AudioClip, ClipLibrary, ClipPayload};
pub use playback::{CommandPlayback, Playback, PlayedClip, RecordingPlayback, SimulatedPlayback};
