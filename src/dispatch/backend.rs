//! Backend contract: request/response types and the [`Backend`] trait.

use crate::detection::objects::DetectedObject;
use crate::error::DialogueFailure;
use crate::session::{ContextTurn, Phase};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Conversational request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRequest {
    pub text: String,
    pub conversation_context: Vec<ContextTurn>,
    pub heart_rate: Option<u32>,
    /// Unix time in seconds.
    pub timestamp: f64,
    pub turn_index: u64,
    pub phase: Phase,
}

/// Usable reply extracted from a backend response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendReply {
    pub text: String,
    /// Encoded speech for `text`, when the backend synthesized it.
    pub audio: Option<Vec<u8>>,
}

/// Why a frame is being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FramePurpose {
    /// Periodic conversational context.
    #[serde(rename = "context")]
    Context,
    /// Object detection cycle.
    #[serde(rename = "coco")]
    Detection,
}

/// Image request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequest {
    /// Base64-encoded still frame.
    pub image: String,
    pub heart_rate: Option<u32>,
    pub timestamp: f64,
    pub frame_id: u64,
    pub detection_type: FramePurpose,
}

/// Parsed image endpoint response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageReply {
    pub frame_id: Option<u64>,
    pub objects: Vec<DetectedObject>,
    /// Advisory text; never spoken.
    pub advisory: Option<String>,
}

/// Remote conversational backend.
///
/// Implementations never retry; timeouts are applied by the caller.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    async fn send_text(&self, request: &TextRequest) -> Result<BackendReply, DialogueFailure>;

    async fn send_image(&self, request: &ImageRequest) -> Result<ImageReply, DialogueFailure>;

    fn name(&self) -> &str;
}

/// Current Unix time in seconds, as sent in request bodies.
pub fn unix_timestamp() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// One scripted backend answer.
#[derive(Debug, Clone)]
pub struct MockStep {
    pub delay: Duration,
    pub result: Result<BackendReply, DialogueFailure>,
}

/// Scripted backend for tests and offline runs.
///
/// Text requests consume scripted steps in order, then repeat the default
/// reply. Every request is recorded.
#[derive(Debug)]
pub struct MockBackend {
    steps: Mutex<VecDeque<MockStep>>,
    default_reply: String,
    default_delay: Duration,
    image_reply: ImageReply,
    image_delay: Duration,
    text_requests: Mutex<Vec<TextRequest>>,
    image_requests: Mutex<Vec<ImageRequest>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            default_reply: "I hear you. Let's take one slow breath together.".to_string(),
            default_delay: Duration::from_millis(200),
            image_reply: ImageReply::default(),
            image_delay: Duration::from_millis(100),
            text_requests: Mutex::new(Vec::new()),
            image_requests: Mutex::new(Vec::new()),
        }
    }

    /// Reply used once the script is exhausted.
    pub fn with_default_reply(mut self, reply: &str, delay: Duration) -> Self {
        self.default_reply = reply.to_string();
        self.default_delay = delay;
        self
    }

    /// Queue a reply.
    pub fn with_reply(self, reply: &str, delay: Duration) -> Self {
        self.push(MockStep {
            delay,
            result: Ok(BackendReply {
                text: reply.to_string(),
                audio: None,
            }),
        })
    }

    /// Queue a failure.
    pub fn with_failure(self, failure: DialogueFailure, delay: Duration) -> Self {
        self.push(MockStep {
            delay,
            result: Err(failure),
        })
    }

    /// Answer every image request with `reply` after `delay`.
    pub fn with_image_reply(mut self, reply: ImageReply, delay: Duration) -> Self {
        self.image_reply = reply;
        self.image_delay = delay;
        self
    }

    fn push(self, step: MockStep) -> Self {
        self.steps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(step);
        self
    }

    /// Text requests received so far.
    pub fn text_requests(&self) -> Vec<TextRequest> {
        self.text_requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Image requests received so far.
    pub fn image_requests(&self) -> Vec<ImageRequest> {
        self.image_requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Backend for MockBackend {
    async fn send_text(&self, request: &TextRequest) -> Result<BackendReply, DialogueFailure> {
        self.text_requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let step = self
            .steps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| MockStep {
                delay: self.default_delay,
                result: Ok(BackendReply {
                    text: self.default_reply.clone(),
                    audio: None,
                }),
            });

        tokio::time::sleep(step.delay).await;
        step.result
    }

    async fn send_image(&self, request: &ImageRequest) -> Result<ImageReply, DialogueFailure> {
        self.image_requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        tokio::time::sleep(self.image_delay).await;
        Ok(self.image_reply.clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
