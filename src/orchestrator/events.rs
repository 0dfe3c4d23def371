//! Events into the coordinator and effects out of it.

use crate::audio::{AudioClip, Channel};
use crate::capture::TranscriptUpdate;
use crate::dispatch::{BackendReply, FramePurpose, ImageReply, TextRequest};
use crate::error::DialogueFailure;
use crate::session::{EndReason, Phase};
use serde::Serialize;
use std::time::Duration;

/// Every timer the coordinator arms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Segmenter debounce window.
    Silence,
    /// Fixed length of the opening announcement.
    OpeningAnnouncement,
    FillerDelay,
    FillerBackstop,
    /// Minimum interval between conversational requests.
    Throttle,
    Inactivity,
    ImageUpdate,
    DetectionCycle,
    /// Safety net for a playback that never reports completion.
    PlaybackDeadline,
}

/// Identity of one armed timer. Only the most recently armed timer of each
/// kind, in the current generation, is honored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId {
    pub kind: TimerKind,
    pub generation: u64,
    pub seq: u64,
}

/// Input to [`Orchestrator::handle`](super::Orchestrator::handle).
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start,
    Stop,
    HeartRate(u32),
    Transcript(TranscriptUpdate),
    TimerFired(TimerId),
    RequestSucceeded {
        request_id: u64,
        generation: u64,
        reply: BackendReply,
    },
    RequestFailed {
        request_id: u64,
        generation: u64,
        failure: DialogueFailure,
    },
    FrameCompleted {
        frame_id: u64,
        generation: u64,
        purpose: FramePurpose,
        detection_cycle: Option<u64>,
        result: Result<ImageReply, DialogueFailure>,
    },
    PlaybackCompleted {
        token: u64,
        channel: Channel,
        generation: u64,
        result: Result<(), DialogueFailure>,
    },
}

/// Side effect requested by the coordinator; executed by the runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    StartTimer {
        id: TimerId,
        after: Duration,
    },
    CancelTimer {
        id: TimerId,
    },
    SendText {
        request_id: u64,
        generation: u64,
        request: TextRequest,
    },
    CancelRequest {
        request_id: u64,
    },
    CaptureFrame {
        frame_id: u64,
        generation: u64,
        purpose: FramePurpose,
        detection_cycle: Option<u64>,
        heart_rate: Option<u32>,
    },
    Play {
        token: u64,
        channel: Channel,
        generation: u64,
        clip: AudioClip,
    },
    StopPlayback {
        token: u64,
    },
    StartListening,
    StopListening,
    PauseCapture,
    ResumeCapture,
    Notify(SessionNotice),
}

/// Observable session events, broadcast to UIs and the visualization layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionNotice {
    PhaseChanged {
        from: Phase,
        to: Phase,
    },
    UtteranceSubmitted {
        text: String,
        forwarded: String,
    },
    UtteranceDropped {
        reason: String,
    },
    RequestDispatched {
        request_id: u64,
        turn_index: u64,
    },
    ReplyReceived {
        request_id: u64,
        text: String,
    },
    Fallback {
        failure: String,
    },
    PlaybackStarted {
        channel: Channel,
        text: String,
    },
    PlaybackFinished {
        channel: Channel,
    },
    PlaybackInterrupted {
        channel: Channel,
    },
    ObjectsDetected {
        labels: Vec<String>,
    },
    ObjectsMentioned {
        labels: Vec<String>,
    },
    Advisory {
        text: String,
    },
    SessionEnded {
        reason: EndReason,
        turns: usize,
    },
}

/// Snapshot published after every event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub phase: Phase,
    pub channel: Option<Channel>,
    pub turns: usize,
    pub heart_rate: Option<u32>,
    pub request_in_flight: bool,
    /// Transcript updates are currently accepted.
    pub listening: bool,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            channel: None,
            turns: 0,
            heart_rate: None,
            request_in_flight: false,
            listening: false,
        }
    }
}
