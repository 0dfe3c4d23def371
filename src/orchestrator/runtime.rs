//! Tokio runtime around the coordinator.
//!
//! One task owns the [`Orchestrator`] and drains a single event queue.
//! Timers, backend calls, frame captures and playback run as spawned tasks
//! whose only output is an event posted back to that queue.

use super::core::{Orchestrator, OrchestratorSettings};
use super::events::{Effect, Event, SessionNotice, SessionStatus, TimerId};
use crate::audio::{AudioClip, ClipLibrary, Playback};
use crate::capture::{CaptureSource, TranscriptUpdate};
use crate::clock::{Clock, TokioClock};
use crate::config::Config;
use crate::dispatch::{Backend, FramePurpose, ImageReply, ImageRequest, TextRequest, unix_timestamp};
use crate::error::{DialogueFailure, GroundedError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

const NOTICE_CAPACITY: usize = 256;

/// External collaborators injected into a session runtime.
#[derive(Clone)]
pub struct Collaborators {
    pub backend: Arc<dyn Backend>,
    pub playback: Arc<dyn Playback>,
    pub capture: Arc<dyn CaptureSource>,
}

/// Per-call timeouts applied around backend requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub text_timeout: Duration,
    pub image_timeout: Duration,
}

impl RuntimeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            text_timeout: Duration::from_millis(config.backend.text_timeout_ms),
            image_timeout: Duration::from_millis(config.backend.image_timeout_ms),
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Control surface of a running session coordinator.
pub struct SessionHandle {
    events: mpsc::UnboundedSender<Event>,
    notices: broadcast::Sender<SessionNotice>,
    status: watch::Receiver<SessionStatus>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    fn post(&self, event: Event) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| GroundedError::SessionClosed)
    }

    /// Begin a session (ignored while one is running).
    pub fn start(&self) -> Result<()> {
        self.post(Event::Start)
    }

    /// End the running session; the closing announcement still plays.
    pub fn stop(&self) -> Result<()> {
        self.post(Event::Stop)
    }

    pub fn heart_rate(&self, bpm: u32) -> Result<()> {
        self.post(Event::HeartRate(bpm))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn status_watch(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the coordinator and every task it spawned.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::error!(error = %e, "session runtime task failed");
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Builds and spawns session coordinators.
pub struct SessionRuntime;

impl SessionRuntime {
    /// Spawn a coordinator configured from `config`, timed by tokio's clock.
    pub fn from_config(config: &Config, collaborators: Collaborators) -> SessionHandle {
        let clips = ClipLibrary::load(config.audio.clip_dir.as_deref(), config.audio.min_audio_bytes);
        let orchestrator = Orchestrator::with_clock(
            OrchestratorSettings::from_config(config),
            clips,
            TokioClock,
        );
        Self::spawn(orchestrator, collaborators, RuntimeSettings::from_config(config))
    }

    /// Spawn a coordinator task around `orchestrator`.
    pub fn spawn<C: Clock + 'static>(
        orchestrator: Orchestrator<C>,
        collaborators: Collaborators,
        settings: RuntimeSettings,
    ) -> SessionHandle {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let (status_tx, status_rx) = watch::channel(orchestrator.status());
        let shutdown = CancellationToken::new();

        let worker = Worker {
            orchestrator,
            collaborators,
            settings,
            events: events_tx.clone(),
            notices: notices.clone(),
            status: status_tx,
            timers: HashMap::new(),
            requests: HashMap::new(),
            playbacks: HashMap::new(),
            frames: JoinSet::new(),
            listener: None,
        };
        let task = tokio::spawn(worker.run(events_rx, shutdown.clone()));

        SessionHandle {
            events: events_tx,
            notices,
            status: status_rx,
            shutdown,
            task: Some(task),
        }
    }
}

fn post(events: &mpsc::UnboundedSender<Event>, event: Event) {
    if events.send(event).is_err() {
        tracing::trace!("coordinator gone, event dropped");
    }
}

struct Worker<C: Clock> {
    orchestrator: Orchestrator<C>,
    collaborators: Collaborators,
    settings: RuntimeSettings,
    events: mpsc::UnboundedSender<Event>,
    notices: broadcast::Sender<SessionNotice>,
    status: watch::Sender<SessionStatus>,
    timers: HashMap<TimerId, AbortHandle>,
    requests: HashMap<u64, AbortHandle>,
    playbacks: HashMap<u64, AbortHandle>,
    frames: JoinSet<()>,
    listener: Option<AbortHandle>,
}

impl<C: Clock + 'static> Worker<C> {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<Event>, shutdown: CancellationToken) {
        tracing::debug!(
            backend = self.collaborators.backend.name(),
            playback = self.collaborators.playback.name(),
            "session runtime started"
        );
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.dispatch(event).await,
                    None => break,
                },
            }
        }
        self.teardown().await;
        tracing::debug!("session runtime stopped");
    }

    async fn dispatch(&mut self, event: Event) {
        match &event {
            Event::TimerFired(id) => {
                self.timers.remove(id);
            }
            Event::RequestSucceeded { request_id, .. } | Event::RequestFailed { request_id, .. } => {
                self.requests.remove(request_id);
            }
            Event::PlaybackCompleted { token, .. } => {
                self.playbacks.remove(token);
            }
            _ => {}
        }
        while self.frames.try_join_next().is_some() {}

        for effect in self.orchestrator.handle(event) {
            self.execute(effect).await;
        }
        self.status.send_replace(self.orchestrator.status());
    }

    async fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::StartTimer { id, after } => {
                let events = self.events.clone();
                let task = tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    post(&events, Event::TimerFired(id));
                });
                if let Some(old) = self.timers.insert(id, task.abort_handle()) {
                    old.abort();
                }
            }
            Effect::CancelTimer { id } => {
                if let Some(timer) = self.timers.remove(&id) {
                    timer.abort();
                }
            }
            Effect::SendText {
                request_id,
                generation,
                request,
            } => self.send_text(request_id, generation, request),
            Effect::CancelRequest { request_id } => {
                if let Some(request) = self.requests.remove(&request_id) {
                    tracing::debug!(request_id, "request cancelled");
                    request.abort();
                }
            }
            Effect::CaptureFrame {
                frame_id,
                generation,
                purpose,
                detection_cycle,
                heart_rate,
            } => self.capture_frame(frame_id, generation, purpose, detection_cycle, heart_rate),
            Effect::Play {
                token,
                channel,
                generation,
                clip,
            } => {
                let playback = Arc::clone(&self.collaborators.playback);
                let events = self.events.clone();
                let task = tokio::spawn(async move {
                    let result = play(playback.as_ref(), &clip).await;
                    post(
                        &events,
                        Event::PlaybackCompleted {
                            token,
                            channel,
                            generation,
                            result,
                        },
                    );
                });
                self.playbacks.insert(token, task.abort_handle());
            }
            Effect::StopPlayback { token } => {
                if let Some(task) = self.playbacks.remove(&token) {
                    task.abort();
                }
                self.collaborators.playback.stop().await;
            }
            Effect::StartListening => self.start_listening(),
            Effect::StopListening => {
                self.collaborators.capture.stop_transcript_stream();
                if let Some(listener) = self.listener.take() {
                    listener.abort();
                }
            }
            Effect::PauseCapture => self.collaborators.capture.pause(),
            Effect::ResumeCapture => self.collaborators.capture.resume(),
            Effect::Notify(notice) => {
                // No subscribers is fine.
                self.notices.send(notice).ok();
            }
        }
    }

    fn send_text(&mut self, request_id: u64, generation: u64, request: TextRequest) {
        let backend = Arc::clone(&self.collaborators.backend);
        let events = self.events.clone();
        let timeout = self.settings.text_timeout;
        let task = tokio::spawn(async move {
            let event = match tokio::time::timeout(timeout, backend.send_text(&request)).await {
                Ok(Ok(reply)) => Event::RequestSucceeded {
                    request_id,
                    generation,
                    reply,
                },
                Ok(Err(failure)) => Event::RequestFailed {
                    request_id,
                    generation,
                    failure,
                },
                Err(_) => Event::RequestFailed {
                    request_id,
                    generation,
                    failure: DialogueFailure::NetworkFailure(format!(
                        "no response within {}ms",
                        timeout.as_millis()
                    )),
                },
            };
            post(&events, event);
        });
        self.requests.insert(request_id, task.abort_handle());
    }

    fn capture_frame(
        &mut self,
        frame_id: u64,
        generation: u64,
        purpose: FramePurpose,
        detection_cycle: Option<u64>,
        heart_rate: Option<u32>,
    ) {
        let capture = Arc::clone(&self.collaborators.capture);
        let backend = Arc::clone(&self.collaborators.backend);
        let events = self.events.clone();
        let timeout = self.settings.image_timeout;
        self.frames.spawn(async move {
            let result = send_frame(
                capture.as_ref(),
                backend.as_ref(),
                timeout,
                frame_id,
                purpose,
                heart_rate,
            )
            .await;
            post(
                &events,
                Event::FrameCompleted {
                    frame_id,
                    generation,
                    purpose,
                    detection_cycle,
                    result,
                },
            );
        });
    }

    fn start_listening(&mut self) {
        let (tx, mut rx) = mpsc::unbounded_channel::<TranscriptUpdate>();
        if let Err(e) = self.collaborators.capture.start_transcript_stream(tx) {
            tracing::warn!(error = %e, "transcript stream unavailable");
            return;
        }
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                post(&events, Event::Transcript(update));
            }
        });
        if let Some(old) = self.listener.replace(task.abort_handle()) {
            old.abort();
        }
    }

    async fn teardown(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
        for (_, request) in self.requests.drain() {
            request.abort();
        }
        let playing = !self.playbacks.is_empty();
        for (_, playback) in self.playbacks.drain() {
            playback.abort();
        }
        if playing {
            self.collaborators.playback.stop().await;
        }
        self.frames.abort_all();
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        self.collaborators.capture.stop_transcript_stream();
    }
}

async fn play(playback: &dyn Playback, clip: &AudioClip) -> std::result::Result<(), DialogueFailure> {
    playback.play(clip).await.map_err(DialogueFailure::from)
}

async fn send_frame(
    capture: &dyn CaptureSource,
    backend: &dyn Backend,
    timeout: Duration,
    frame_id: u64,
    purpose: FramePurpose,
    heart_rate: Option<u32>,
) -> std::result::Result<ImageReply, DialogueFailure> {
    let frame = capture
        .capture_still_frame()
        .await
        .map_err(DialogueFailure::from)?;
    let request = ImageRequest {
        image: STANDARD.encode(frame),
        heart_rate,
        timestamp: unix_timestamp(),
        frame_id,
        detection_type: purpose,
    };
    tokio::time::timeout(timeout, backend.send_image(&request))
        .await
        .map_err(|_| {
            DialogueFailure::NetworkFailure(format!("no image response within {}ms", timeout.as_millis()))
        })?
}
