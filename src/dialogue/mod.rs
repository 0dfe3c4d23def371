//! User-speech side of the dialogue: segmentation and text heuristics.

pub mod segmenter;
pub mod text;

pub use segmenter::{
    DropReason, SegmenterConfig, SpeechSegment, SpeechSegmenter, Submission, UpdateOutcome,
    Utterance,
};
