//! The session coordinator.
//!
//! [`Orchestrator::handle`] maps one event to a list of effects. It never
//! blocks, never awaits and owns every piece of mutable session state, so
//! running it from a single task gives the mutual exclusion the session
//! needs.

use super::events::{Effect, Event, SessionNotice, SessionStatus, TimerId, TimerKind};
use crate::audio::{Admission, AudioArbiter, AudioClip, Channel, ClipLibrary};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::defaults;
use crate::detection::{DetectionGate, mentioned_objects};
use crate::dialogue::text::{find_phrase, word_count, word_similarity};
use crate::dialogue::{SegmenterConfig, SpeechSegmenter, Submission, UpdateOutcome};
use crate::dispatch::{
    BackendReply, DispatchDecision, FramePurpose, ImageReply, OutgoingText, RequestDispatcher,
    TextRequest, unix_timestamp,
};
use crate::error::DialogueFailure;
use crate::filler::{FillerScheduler, FillerTrigger};
use crate::session::{ConversationTurn, EndReason, Phase, Session};
use std::collections::HashMap;
use std::time::Duration;

/// Coordinator settings, derived from [`Config`].
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub segmenter: SegmenterConfig,
    pub end_phrases: Vec<String>,
    pub interrupt_min_words: usize,
    pub echo_similarity: f64,
    pub context_turns: usize,
    pub min_request_interval: Duration,
    pub opening_announcement: Duration,
    pub inactivity_timeout: Duration,
    pub image_update_interval: Duration,
    pub playback_grace: Duration,
    pub filler_delay: Duration,
    pub filler_backstop: Duration,
    pub min_audio_bytes: usize,
    pub elevated_heart_rate: u32,
    pub calm_heart_rate: u32,
    pub scanning_interval: Duration,
    pub interactive_interval: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        let ms = Duration::from_millis;
        Self {
            segmenter: SegmenterConfig::from(&config.dialogue),
            end_phrases: config.dialogue.end_phrases.clone(),
            interrupt_min_words: config.dialogue.interrupt_min_words,
            echo_similarity: defaults::ECHO_SIMILARITY,
            context_turns: config.backend.context_turns,
            min_request_interval: ms(config.backend.min_request_interval_ms),
            opening_announcement: ms(config.dialogue.opening_announcement_ms),
            inactivity_timeout: Duration::from_secs(config.dialogue.inactivity_timeout_secs),
            image_update_interval: ms(config.backend.image_update_interval_ms),
            playback_grace: ms(config.audio.playback_grace_ms),
            filler_delay: ms(config.audio.filler_delay_ms),
            filler_backstop: ms(config.audio.filler_backstop_ms),
            min_audio_bytes: config.audio.min_audio_bytes,
            elevated_heart_rate: config.dialogue.elevated_heart_rate,
            calm_heart_rate: config.dialogue.calm_heart_rate,
            scanning_interval: ms(config.detection.scanning_interval_ms),
            interactive_interval: ms(config.detection.interactive_interval_ms),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Single owner of all session state.
pub struct Orchestrator<C: Clock = SystemClock> {
    settings: OrchestratorSettings,
    clock: C,
    clips: ClipLibrary,
    /// Bumped on every start, end and teardown; results tagged with an older
    /// generation are dropped.
    generation: u64,
    session: Option<Session>,
    end_reason: Option<EndReason>,
    heart_rate: Option<u32>,
    segmenter: SpeechSegmenter,
    dispatcher: RequestDispatcher,
    arbiter: AudioArbiter,
    filler: FillerScheduler,
    detection: DetectionGate,
    timers: HashMap<TimerKind, u64>,
    next_timer_seq: u64,
    deadline_token: Option<u64>,
    capture_paused: bool,
    effects: Vec<Effect>,
}

impl Orchestrator<SystemClock> {
    pub fn new(settings: OrchestratorSettings, clips: ClipLibrary) -> Self {
        Self::with_clock(settings, clips, SystemClock)
    }
}

impl<C: Clock> Orchestrator<C> {
    pub fn with_clock(settings: OrchestratorSettings, clips: ClipLibrary, clock: C) -> Self {
        Self {
            segmenter: SpeechSegmenter::new(settings.segmenter.clone()),
            dispatcher: RequestDispatcher::new(settings.min_request_interval),
            arbiter: AudioArbiter::new(),
            filler: FillerScheduler::new(settings.elevated_heart_rate, settings.calm_heart_rate),
            detection: DetectionGate::new(
                settings.scanning_interval,
                settings.interactive_interval,
            ),
            settings,
            clock,
            clips,
            generation: 0,
            session: None,
            end_reason: None,
            heart_rate: None,
            timers: HashMap::new(),
            next_timer_seq: 1,
            deadline_token: None,
            capture_paused: false,
            effects: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.session.as_ref().map_or(Phase::Idle, |s| s.phase)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn arbiter(&self) -> &AudioArbiter {
        &self.arbiter
    }

    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    pub fn detection(&self) -> &DetectionGate {
        &self.detection
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Id of the armed timer of `kind`, if any.
    pub fn armed_timer(&self, kind: TimerKind) -> Option<TimerId> {
        self.timers.get(&kind).map(|&seq| TimerId {
            kind,
            generation: self.generation,
            seq,
        })
    }

    pub fn status(&self) -> SessionStatus {
        let phase = self.phase();
        SessionStatus {
            phase,
            channel: self.arbiter.active_channel(),
            turns: self.session.as_ref().map_or(0, |s| s.history.len()),
            heart_rate: self.heart_rate,
            request_in_flight: self.dispatcher.in_flight().is_some(),
            listening: phase.accepts_speech() && !self.arbiter.capture_muted(),
        }
    }

    /// Apply one event and return the effects to execute, in order.
    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::Start => self.on_start(),
            Event::Stop => self.on_stop(),
            Event::HeartRate(bpm) => self.on_heart_rate(bpm),
            Event::Transcript(update) => self.on_transcript(&update.text, update.is_final),
            Event::TimerFired(id) => self.on_timer(id),
            Event::RequestSucceeded {
                request_id,
                generation,
                reply,
            } => self.on_reply(request_id, generation, reply),
            Event::RequestFailed {
                request_id,
                generation,
                failure,
            } => self.on_request_failed(request_id, generation, failure),
            Event::FrameCompleted {
                frame_id,
                generation,
                purpose,
                detection_cycle,
                result,
            } => self.on_frame(frame_id, generation, purpose, detection_cycle, result),
            Event::PlaybackCompleted {
                token,
                channel,
                generation,
                result,
            } => self.on_playback_completed(token, channel, generation, result),
        }
        self.sync_capture();
        std::mem::take(&mut self.effects)
    }

    // --- session lifecycle -------------------------------------------------

    fn on_start(&mut self) {
        if let Some(session) = &self.session {
            tracing::warn!(phase = %session.phase, "start ignored, session already running");
            return;
        }
        let now = self.clock.now();
        self.cancel_all_timers();
        self.generation += 1;
        self.segmenter.reset();
        self.dispatcher.reset();
        self.filler.reset();
        self.detection.reset();
        self.deadline_token = None;
        self.end_reason = None;

        let mut session = Session::begin(now);
        session.heart_rate = self.heart_rate;
        self.session = Some(session);
        tracing::info!(generation = self.generation, "session started");
        self.notify(SessionNotice::PhaseChanged {
            from: Phase::Idle,
            to: Phase::Initializing,
        });

        self.effects.push(Effect::StartListening);
        let opening = self.clips.opening.clone();
        self.start_playback(Channel::Critical, opening);
        self.arm(TimerKind::OpeningAnnouncement, self.settings.opening_announcement);
    }

    fn on_stop(&mut self) {
        match self.phase() {
            Phase::Idle => tracing::debug!("stop ignored, no session"),
            Phase::Ending => tracing::debug!("stop ignored, session already ending"),
            _ => self.end_session(EndReason::Stopped),
        }
    }

    fn on_heart_rate(&mut self, bpm: u32) {
        tracing::debug!(bpm, "heart rate");
        self.heart_rate = Some(bpm);
        if let Some(session) = &mut self.session {
            session.heart_rate = Some(bpm);
        }
    }

    fn set_phase(&mut self, to: Phase) {
        let Some(session) = &mut self.session else {
            return;
        };
        let from = session.phase;
        if !from.can_transition_to(to) {
            tracing::warn!(%from, %to, "illegal phase transition ignored");
            return;
        }
        session.phase = to;
        tracing::info!(%from, %to, "phase changed");
        self.notify(SessionNotice::PhaseChanged { from, to });
    }

    /// Opening announcement elapsed: start listening and the visual loops.
    fn begin_dialogue(&mut self) {
        if self.phase() != Phase::Initializing {
            return;
        }
        if let Some(active) = self.arbiter.active()
            && active.channel == Channel::Critical
        {
            let token = active.token;
            tracing::debug!(token, "opening announcement overran, releasing");
            self.effects.push(Effect::StopPlayback { token });
            self.release_playback(token);
        }

        self.set_phase(Phase::Stabilizing);
        self.arm(TimerKind::ImageUpdate, self.settings.image_update_interval);
        self.arm_detection();

        self.set_phase(Phase::ContinuousDialogue);
        let now = self.clock.now();
        if let Some(session) = &mut self.session {
            session.dialogue_started_at = Some(now);
        }
        self.arm(TimerKind::Inactivity, self.settings.inactivity_timeout);
    }

    fn end_session(&mut self, reason: EndReason) {
        tracing::info!(%reason, "ending session");
        self.set_phase(Phase::Ending);
        self.end_reason = Some(reason);
        self.cancel_all_timers();
        self.generation += 1;

        if let Some(request_id) = self.dispatcher.cancel() {
            self.effects.push(Effect::CancelRequest { request_id });
        }
        self.filler.cancel();
        self.segmenter.clear();
        self.detection.abandon();
        if let Some(active) = self.arbiter.force_release() {
            self.effects.push(Effect::StopPlayback {
                token: active.token,
            });
            self.notify(SessionNotice::PlaybackInterrupted {
                channel: active.channel,
            });
        }
        self.deadline_token = None;

        let closing = self.clips.closing.clone();
        self.start_playback(Channel::Critical, closing);
    }

    /// Closing announcement done (or failed): discard the session.
    fn finish_session(&mut self) {
        self.set_phase(Phase::Idle);
        self.cancel_all_timers();
        self.generation += 1;
        self.dispatcher.cancel();
        self.segmenter.reset();
        self.detection.reset();
        self.effects.push(Effect::StopListening);

        let turns = self.session.take().map_or(0, |s| s.history.len());
        let reason = self.end_reason.take().unwrap_or(EndReason::Stopped);
        tracing::info!(%reason, turns, "session ended");
        self.notify(SessionNotice::SessionEnded { reason, turns });
    }

    // --- speech ------------------------------------------------------------

    fn on_transcript(&mut self, text: &str, is_final: bool) {
        let phase = self.phase();
        if !phase.accepts_speech() {
            tracing::trace!(%phase, "transcript discarded, not listening");
            return;
        }

        if let Some(active) = self.arbiter.active() {
            let (token, channel) = (active.token, active.channel);
            if !self.is_interruption(text, is_final, &active.clip.text, channel) {
                tracing::trace!(%channel, "transcript discarded while speaking");
                return;
            }
            tracing::info!(%channel, "user interrupted playback");
            self.effects.push(Effect::StopPlayback { token });
            self.release_playback(token);
            self.arbiter.take_queued_reply();
            self.notify(SessionNotice::PlaybackInterrupted { channel });
        }

        let now = self.clock.now();
        match self.segmenter.on_update(text, is_final, true, now) {
            UpdateOutcome::Discarded => {}
            UpdateOutcome::AwaitSilence => {
                self.arm(TimerKind::Silence, self.settings.segmenter.silence);
            }
            UpdateOutcome::Completed(submission) => {
                self.disarm(TimerKind::Silence);
                self.on_submission(submission);
            }
        }
    }

    /// Genuine user speech over interruptible audio: a final transcript that
    /// is not an echo of what we are saying. Replies also need a minimum
    /// length; filler yields to any speech.
    fn is_interruption(&self, text: &str, is_final: bool, spoken: &str, channel: Channel) -> bool {
        let long_enough = match channel {
            Channel::Reply => word_count(text) >= self.settings.interrupt_min_words,
            Channel::Filler => !text.trim().is_empty(),
            Channel::Critical => false,
        };
        is_final
            && channel.is_interruptible()
            && long_enough
            && word_similarity(text, spoken) < self.settings.echo_similarity
    }

    fn on_silence(&mut self) {
        if let Some(submission) = self.segmenter.on_silence() {
            self.on_submission(submission);
        }
    }

    fn on_submission(&mut self, submission: Submission) {
        let utterance = match submission {
            Submission::Accepted(utterance) => utterance,
            Submission::Dropped { reason, candidate } => {
                // Guards protect the backend, not the end-of-session check.
                if let Some(phrase) = find_phrase(&candidate, &self.settings.end_phrases) {
                    let phrase = phrase.to_string();
                    if self.record_utterance(&candidate, &candidate).is_some() {
                        self.end_on_phrase(phrase, &candidate);
                    }
                    return;
                }
                tracing::debug!(%reason, "utterance dropped");
                self.notify(SessionNotice::UtteranceDropped {
                    reason: reason.to_string(),
                });
                return;
            }
        };

        let Some(user_turn) = self.record_utterance(&utterance.raw, &utterance.forwarded) else {
            return;
        };

        if let Some(phrase) = find_phrase(&utterance.raw, &self.settings.end_phrases) {
            let phrase = phrase.to_string();
            self.end_on_phrase(phrase, &utterance.raw);
            return;
        }

        let now = self.clock.now();
        let decision = self.dispatcher.submit(utterance.forwarded, user_turn, now);
        self.apply_dispatch(decision);
    }

    /// Append a user turn and announce it. Returns the turn's history index.
    fn record_utterance(&mut self, raw: &str, forwarded: &str) -> Option<usize> {
        let now = self.clock.now();
        let session = self.session.as_mut()?;
        session.history.push(ConversationTurn::UserUtterance {
            text: raw.to_string(),
            submitted_at: now,
        });
        let user_turn = session.history.len() - 1;
        tracing::info!(text = %forwarded, "utterance submitted");
        self.notify(SessionNotice::UtteranceSubmitted {
            text: raw.to_string(),
            forwarded: forwarded.to_string(),
        });
        Some(user_turn)
    }

    fn end_on_phrase(&mut self, phrase: String, text: &str) {
        tracing::info!(%phrase, %text, "end phrase matched");
        self.end_session(EndReason::EndPhrase { phrase });
    }

    // --- requests ----------------------------------------------------------

    fn apply_dispatch(&mut self, decision: DispatchDecision) {
        match decision {
            DispatchDecision::Send(outgoing) => self.send(outgoing),
            DispatchDecision::Queued { replaced } => {
                tracing::debug!(replaced, "request in flight, utterance queued");
            }
            DispatchDecision::Throttled { wait, replaced } => {
                tracing::debug!(wait_ms = wait.as_millis() as u64, replaced, "throttled");
                self.arm(TimerKind::Throttle, wait);
            }
            DispatchDecision::Idle => {}
        }
    }

    fn send(&mut self, outgoing: OutgoingText) {
        let Some(session) = &self.session else {
            return;
        };
        let request = TextRequest {
            text: outgoing.text,
            conversation_context: session
                .history
                .context_excluding(outgoing.user_turn, self.settings.context_turns),
            heart_rate: session.heart_rate,
            timestamp: unix_timestamp(),
            turn_index: outgoing.turn_index,
            phase: session.phase,
        };
        tracing::info!(
            request_id = outgoing.request_id,
            turn = outgoing.turn_index,
            "dispatching request"
        );
        self.effects.push(Effect::SendText {
            request_id: outgoing.request_id,
            generation: self.generation,
            request,
        });
        self.notify(SessionNotice::RequestDispatched {
            request_id: outgoing.request_id,
            turn_index: outgoing.turn_index,
        });

        self.filler.arm(outgoing.request_id);
        self.arm(TimerKind::FillerDelay, self.settings.filler_delay);
        self.arm(TimerKind::FillerBackstop, self.settings.filler_backstop);
    }

    fn accept_result(&mut self, request_id: u64, generation: u64) -> bool {
        if generation != self.generation || !self.dispatcher.complete(request_id) {
            tracing::debug!(request_id, generation, "stale response discarded");
            return false;
        }
        self.filler.cancel();
        self.disarm(TimerKind::FillerDelay);
        self.disarm(TimerKind::FillerBackstop);
        true
    }

    fn on_reply(&mut self, request_id: u64, generation: u64, reply: BackendReply) {
        if !self.accept_result(request_id, generation) {
            return;
        }
        let now = self.clock.now();
        let clip = AudioClip::from_reply(&reply.text, reply.audio, self.settings.min_audio_bytes);
        tracing::info!(request_id, text = %reply.text, "reply received");

        if let Some(session) = &mut self.session {
            session.last_response_at = Some(now);
            session.history.push(ConversationTurn::AgentReply {
                text: reply.text.clone(),
                audio_ref: clip.source.clone(),
            });
        }
        let mentioned = mentioned_objects(&reply.text, self.detection.objects());
        self.notify(SessionNotice::ReplyReceived {
            request_id,
            text: reply.text,
        });
        if !mentioned.is_empty() {
            self.notify(SessionNotice::ObjectsMentioned { labels: mentioned });
        }

        self.speak_reply(clip, request_id);
        let next = self.dispatcher.poll(now);
        self.apply_dispatch(next);
    }

    fn on_request_failed(&mut self, request_id: u64, generation: u64, failure: DialogueFailure) {
        if !self.accept_result(request_id, generation) {
            return;
        }
        tracing::warn!(request_id, %failure, "request failed");
        if failure.warrants_fallback() {
            self.notify(SessionNotice::Fallback {
                failure: failure.to_string(),
            });
            let fallback = self.clips.fallback.clone();
            self.speak_reply(fallback, request_id);
        }
        let next = self.dispatcher.poll(self.clock.now());
        self.apply_dispatch(next);
    }

    /// Reply-priority output: waits for a playing reply or announcement,
    /// replacing anything already waiting.
    fn speak_reply(&mut self, clip: AudioClip, request_id: u64) {
        match self.arbiter.active_channel() {
            Some(Channel::Reply | Channel::Critical) => {
                if let Some(replaced) = self.arbiter.queue_reply(clip, request_id) {
                    tracing::debug!(replaced, request_id, "queued reply superseded");
                }
            }
            _ => {
                self.start_playback(Channel::Reply, clip);
            }
        }
    }

    // --- audio -------------------------------------------------------------

    fn start_playback(&mut self, channel: Channel, clip: AudioClip) -> bool {
        let now = self.clock.now();
        let expected = clip.expected_duration();
        let text = clip.text.clone();
        match self.arbiter.acquire(channel, clip.clone(), now) {
            Admission::Rejected { active } => {
                let failure = DialogueFailure::ResourceContention(format!(
                    "{channel} requested while {active} is playing"
                ));
                tracing::debug!(%failure, "playback dropped");
                false
            }
            Admission::Granted { token, preempted } => {
                if let Some(preempted) = preempted {
                    tracing::debug!(channel = %preempted.channel, "playback preempted");
                    self.effects.push(Effect::StopPlayback {
                        token: preempted.token,
                    });
                    self.notify(SessionNotice::PlaybackInterrupted {
                        channel: preempted.channel,
                    });
                }
                // The output speaks over any half-heard candidate.
                self.segmenter.clear();
                self.disarm(TimerKind::Silence);

                tracing::info!(%channel, token, "playback started");
                self.effects.push(Effect::Play {
                    token,
                    channel,
                    generation: self.generation,
                    clip,
                });
                self.notify(SessionNotice::PlaybackStarted { channel, text });
                self.deadline_token = Some(token);
                self.arm(
                    TimerKind::PlaybackDeadline,
                    expected + self.settings.playback_grace,
                );
                true
            }
        }
    }

    /// Release `token`; returns whether it was the active playback.
    fn release_playback(&mut self, token: u64) -> bool {
        let Some(finished) = self.arbiter.release(token) else {
            return false;
        };
        if self.deadline_token == Some(token) {
            self.deadline_token = None;
            self.disarm(TimerKind::PlaybackDeadline);
        }
        self.notify(SessionNotice::PlaybackFinished {
            channel: finished.channel,
        });
        true
    }

    fn on_playback_completed(
        &mut self,
        token: u64,
        channel: Channel,
        generation: u64,
        result: Result<(), DialogueFailure>,
    ) {
        if let Err(failure) = &result {
            tracing::warn!(%channel, token, %failure, "playback failed");
        }
        if !self.release_playback(token) {
            tracing::trace!(token, generation, "stale playback completion");
            return;
        }
        tracing::debug!(%channel, token, "playback finished");
        self.after_release(channel);
    }

    fn after_release(&mut self, channel: Channel) {
        if channel == Channel::Critical && self.phase() == Phase::Ending {
            self.finish_session();
            return;
        }
        if let Some(queued) = self.arbiter.take_queued_reply() {
            tracing::debug!(request_id = queued.request_id, "playing queued reply");
            self.start_playback(Channel::Reply, queued.clip);
        }
    }

    fn on_playback_deadline(&mut self) {
        let Some(token) = self.deadline_token else {
            return;
        };
        let Some(channel) = self.arbiter.active().filter(|a| a.token == token).map(|a| a.channel)
        else {
            return;
        };
        tracing::warn!(%channel, token, "playback never completed, releasing");
        self.effects.push(Effect::StopPlayback { token });
        self.release_playback(token);
        self.after_release(channel);
    }

    fn on_filler_timer(&mut self, trigger: FillerTrigger) {
        let Some(request_id) = self.filler.armed_for() else {
            return;
        };
        let outstanding = self.dispatcher.is_in_flight(request_id);
        if !self
            .filler
            .should_play(request_id, outstanding, self.arbiter.active_channel())
        {
            return;
        }
        let heart_rate = self.session.as_ref().and_then(|s| s.heart_rate);
        let category = self.filler.category(trigger, heart_rate);
        let phrase = self.filler.next_phrase(category);
        tracing::debug!(request_id, ?category, ?trigger, "filler");
        self.start_playback(Channel::Filler, AudioClip::speech(phrase).with_source("filler"));
    }

    /// Capture is hard-paused outside listening phases and under critical
    /// audio. Replies and fillers only mute the segmenter so the user can
    /// still interrupt them.
    fn sync_capture(&mut self) {
        if self.session.is_none() {
            self.capture_paused = false;
            return;
        }
        let paused = !self.phase().accepts_speech()
            || self.arbiter.active_channel() == Some(Channel::Critical);
        if paused != self.capture_paused {
            self.capture_paused = paused;
            self.effects.push(if paused {
                Effect::PauseCapture
            } else {
                Effect::ResumeCapture
            });
        }
    }

    // --- visual loops ------------------------------------------------------

    fn arm_detection(&mut self) {
        if let Some(interval) = self.detection.interval_for(self.phase()) {
            self.arm(TimerKind::DetectionCycle, interval);
        }
    }

    fn on_image_update(&mut self) {
        if !self.phase().runs_visual_loops() {
            return;
        }
        let frame_id = self.dispatcher.next_frame_id();
        self.effects.push(Effect::CaptureFrame {
            frame_id,
            generation: self.generation,
            purpose: FramePurpose::Context,
            detection_cycle: None,
            heart_rate: self.heart_rate,
        });
        self.arm(TimerKind::ImageUpdate, self.settings.image_update_interval);
    }

    fn on_detection_tick(&mut self) {
        if !self.phase().runs_visual_loops() {
            return;
        }
        match self.detection.try_begin() {
            Some(cycle) => {
                let frame_id = self.dispatcher.next_frame_id();
                self.effects.push(Effect::CaptureFrame {
                    frame_id,
                    generation: self.generation,
                    purpose: FramePurpose::Detection,
                    detection_cycle: Some(cycle),
                    heart_rate: self.heart_rate,
                });
            }
            None => tracing::trace!("detection cycle skipped, previous still processing"),
        }
        self.arm_detection();
    }

    fn on_frame(
        &mut self,
        frame_id: u64,
        generation: u64,
        purpose: FramePurpose,
        detection_cycle: Option<u64>,
        result: Result<ImageReply, DialogueFailure>,
    ) {
        if generation != self.generation {
            tracing::trace!(frame_id, "stale frame result");
            return;
        }
        if let Err(failure) = &result {
            tracing::debug!(frame_id, ?purpose, %failure, "frame dropped");
        }
        match (purpose, detection_cycle) {
            (FramePurpose::Detection, Some(cycle)) => {
                let objects = result.ok().map(|reply| reply.objects);
                let labels: Vec<String> = objects
                    .iter()
                    .flatten()
                    .map(|object| object.label.clone())
                    .collect();
                if self.detection.finish(cycle, objects) && !labels.is_empty() {
                    self.notify(SessionNotice::ObjectsDetected { labels });
                }
            }
            _ => {
                if let Ok(ImageReply {
                    advisory: Some(text),
                    ..
                }) = result
                {
                    self.notify(SessionNotice::Advisory { text });
                }
            }
        }
    }

    fn on_inactivity_check(&mut self) {
        if self.phase() != Phase::ContinuousDialogue {
            return;
        }
        let now = self.clock.now();
        let silent = self
            .session
            .as_ref()
            .and_then(|s| s.silent_for(now))
            .unwrap_or_default();
        if silent >= self.settings.inactivity_timeout {
            self.end_session(EndReason::Inactivity);
        } else {
            self.arm(
                TimerKind::Inactivity,
                self.settings.inactivity_timeout - silent,
            );
        }
    }

    // --- timers ------------------------------------------------------------

    fn on_timer(&mut self, id: TimerId) {
        if id.generation != self.generation || self.timers.get(&id.kind) != Some(&id.seq) {
            tracing::trace!(?id, "stale timer");
            return;
        }
        self.timers.remove(&id.kind);
        match id.kind {
            TimerKind::Silence => self.on_silence(),
            TimerKind::OpeningAnnouncement => self.begin_dialogue(),
            TimerKind::FillerDelay => self.on_filler_timer(FillerTrigger::Delay),
            TimerKind::FillerBackstop => self.on_filler_timer(FillerTrigger::Backstop),
            TimerKind::Throttle => {
                let decision = self.dispatcher.poll(self.clock.now());
                self.apply_dispatch(decision);
            }
            TimerKind::Inactivity => self.on_inactivity_check(),
            TimerKind::ImageUpdate => self.on_image_update(),
            TimerKind::DetectionCycle => self.on_detection_tick(),
            TimerKind::PlaybackDeadline => self.on_playback_deadline(),
        }
    }

    fn arm(&mut self, kind: TimerKind, after: Duration) {
        self.disarm(kind);
        let seq = self.next_timer_seq;
        self.next_timer_seq += 1;
        self.timers.insert(kind, seq);
        self.effects.push(Effect::StartTimer {
            id: TimerId {
                kind,
                generation: self.generation,
                seq,
            },
            after,
        });
    }

    fn disarm(&mut self, kind: TimerKind) {
        if let Some(seq) = self.timers.remove(&kind) {
            self.effects.push(Effect::CancelTimer {
                id: TimerId {
                    kind,
                    generation: self.generation,
                    seq,
                },
            });
        }
    }

    fn cancel_all_timers(&mut self) {
        let kinds: Vec<TimerKind> = self.timers.keys().copied().collect();
        for kind in kinds {
            self.disarm(kind);
        }
    }

    fn notify(&mut self, notice: SessionNotice) {
        self.effects.push(Effect::Notify(notice));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::TranscriptUpdate;
    use crate::clock::ManualClock;
    use crate::detection::DetectedObject;
    use std::sync::Arc;

    struct Harness {
        orch: Orchestrator<Arc<ManualClock>>,
        clock: Arc<ManualClock>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_settings(OrchestratorSettings::default())
        }

        fn with_settings(settings: OrchestratorSettings) -> Self {
            let clock = Arc::new(ManualClock::new());
            let orch = Orchestrator::with_clock(settings, ClipLibrary::default(), clock.clone());
            Self { orch, clock }
        }

        fn advance(&self, ms: u64) {
            self.clock.advance(Duration::from_millis(ms));
        }

        fn fire(&mut self, kind: TimerKind) -> Vec<Effect> {
            let id = self
                .orch
                .armed_timer(kind)
                .unwrap_or_else(|| panic!("{:?} not armed", kind));
            self.orch.handle(Event::TimerFired(id))
        }

        fn say(&mut self, text: &str) -> Vec<Effect> {
            self.orch
                .handle(Event::Transcript(TranscriptUpdate::final_text(text)))
        }

        /// Start and get through the opening announcement.
        fn in_dialogue() -> Self {
            let mut h = Self::new();
            let effects = h.orch.handle(Event::Start);
            let token = play_token(&effects, Channel::Critical);
            h.advance(7_200);
            h.complete(token, Channel::Critical);
            h.advance(800);
            h.fire(TimerKind::OpeningAnnouncement);
            assert_eq!(h.orch.phase(), Phase::ContinuousDialogue);
            h
        }

        fn complete(&mut self, token: u64, channel: Channel) -> Vec<Effect> {
            let generation = self.orch.generation();
            self.orch.handle(Event::PlaybackCompleted {
                token,
                channel,
                generation,
                result: Ok(()),
            })
        }

        fn reply(&mut self, request_id: u64, text: &str) -> Vec<Effect> {
            let generation = self.orch.generation();
            self.orch.handle(Event::RequestSucceeded {
                request_id,
                generation,
                reply: BackendReply {
                    text: text.to_string(),
                    audio: None,
                },
            })
        }
    }

    fn play_token(effects: &[Effect], channel: Channel) -> u64 {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::Play {
                    token, channel: c, ..
                } if *c == channel => Some(*token),
                _ => None,
            })
            .unwrap_or_else(|| panic!("no {channel} playback in {effects:?}"))
    }

    fn sent_request(effects: &[Effect]) -> Option<(u64, TextRequest)> {
        effects.iter().find_map(|e| match e {
            Effect::SendText {
                request_id,
                request,
                ..
            } => Some((*request_id, request.clone())),
            _ => None,
        })
    }

    fn has(effects: &[Effect], wanted: &Effect) -> bool {
        effects.iter().any(|e| e == wanted)
    }

    #[test]
    fn test_start_plays_critical_opening_and_pauses_capture() {
        let mut h = Harness::new();
        let effects = h.orch.handle(Event::Start);
        assert_eq!(h.orch.phase(), Phase::Initializing);
        assert!(has(&effects, &Effect::StartListening));
        assert!(has(&effects, &Effect::PauseCapture));
        play_token(&effects, Channel::Critical);
        assert!(h.orch.armed_timer(TimerKind::OpeningAnnouncement).is_some());
        assert!(h.orch.armed_timer(TimerKind::DetectionCycle).is_none());
    }

    #[test]
    fn test_speech_during_opening_is_discarded() {
        let mut h = Harness::new();
        h.orch.handle(Event::Start);
        let effects = h.say("please stop talking to me right now");
        assert!(sent_request(&effects).is_none());
        assert_eq!(h.orch.session().unwrap().history.len(), 0);
    }

    #[test]
    fn test_opening_timer_moves_to_dialogue_and_starts_loops() {
        let mut h = Harness::new();
        let effects = h.orch.handle(Event::Start);
        let token = play_token(&effects, Channel::Critical);
        h.advance(8_000);
        let effects = h.fire(TimerKind::OpeningAnnouncement);

        // Announcement overran: it is cut off at the fixed duration.
        assert!(has(&effects, &Effect::StopPlayback { token }));
        assert!(has(&effects, &Effect::ResumeCapture));
        assert_eq!(h.orch.phase(), Phase::ContinuousDialogue);
        assert_eq!(h.orch.arbiter().active_channel(), None);
        for kind in [
            TimerKind::ImageUpdate,
            TimerKind::DetectionCycle,
            TimerKind::Inactivity,
        ] {
            assert!(h.orch.armed_timer(kind).is_some(), "{kind:?}");
        }
        assert!(h.orch.status().listening);
    }

    #[test]
    fn test_final_transcript_dispatches_with_context() {
        let mut h = Harness::in_dialogue();
        h.orch.handle(Event::HeartRate(112));
        let effects = h.say("the light is too bright");
        let (request_id, request) = sent_request(&effects).unwrap();
        assert_eq!(request.text, "the light is too bright");
        assert_eq!(request.turn_index, 1);
        assert_eq!(request.heart_rate, Some(112));
        assert!(request.conversation_context.is_empty());
        assert!(h.orch.dispatcher().is_in_flight(request_id));
        assert!(h.orch.armed_timer(TimerKind::FillerDelay).is_some());
        assert!(h.orch.armed_timer(TimerKind::FillerBackstop).is_some());
    }

    #[test]
    fn test_partial_waits_for_silence() {
        let mut h = Harness::in_dialogue();
        let effects = h
            .orch
            .handle(Event::Transcript(TranscriptUpdate::partial("I keep")));
        assert!(sent_request(&effects).is_none());
        h.orch.handle(Event::Transcript(TranscriptUpdate::partial(
            "I keep hearing my heart",
        )));
        h.advance(2_000);
        let effects = h.fire(TimerKind::Silence);
        let (_, request) = sent_request(&effects).unwrap();
        assert_eq!(request.text, "I keep hearing my heart");
    }

    #[test]
    fn test_filler_plays_then_reply_preempts_it() {
        let mut h = Harness::in_dialogue();
        let (request_id, _) = sent_request(&h.say("the light is too bright")).unwrap();

        h.advance(1_500);
        let effects = h.fire(TimerKind::FillerDelay);
        let filler = play_token(&effects, Channel::Filler);
        assert!(!h.orch.status().listening);

        h.advance(300);
        let effects = h.reply(request_id, "Try dimming the lights.");
        assert!(has(&effects, &Effect::StopPlayback { token: filler }));
        let reply = play_token(&effects, Channel::Reply);
        assert!(h.orch.armed_timer(TimerKind::FillerBackstop).is_none());

        // Filler's own completion arrives late and is ignored.
        h.complete(filler, Channel::Filler);
        assert_eq!(h.orch.arbiter().active_channel(), Some(Channel::Reply));

        h.advance(2_000);
        h.complete(reply, Channel::Reply);
        assert_eq!(h.orch.arbiter().active_channel(), None);
        assert!(h.orch.status().listening);
        assert_eq!(h.orch.session().unwrap().history.len(), 2);
    }

    #[test]
    fn test_short_speech_interrupts_filler() {
        let mut h = Harness::in_dialogue();
        sent_request(&h.say("the light is too bright")).unwrap();
        h.advance(1_500);
        let filler = play_token(&h.fire(TimerKind::FillerDelay), Channel::Filler);

        let effects = h.say("wait, stop");
        assert!(has(&effects, &Effect::StopPlayback { token: filler }));
        assert_eq!(h.orch.arbiter().active_channel(), None);
        assert!(h.orch.status().listening);
    }

    #[test]
    fn test_fast_reply_suppresses_filler() {
        let mut h = Harness::in_dialogue();
        let (request_id, _) = sent_request(&h.say("the light is too bright")).unwrap();
        h.advance(400);
        h.reply(request_id, "Let's close the blinds.");
        assert!(h.orch.armed_timer(TimerKind::FillerDelay).is_none());
        assert!(h.orch.armed_timer(TimerKind::FillerBackstop).is_none());
    }

    #[test]
    fn test_latest_wins_while_request_in_flight() {
        let mut h = Harness::in_dialogue();
        let (first, _) = sent_request(&h.say("my chest feels very tight")).unwrap();
        h.advance(100);
        assert!(sent_request(&h.say("I cannot slow my breathing")).is_none());
        assert!(sent_request(&h.say("everything is spinning around me")).is_none());

        h.advance(1_500);
        let effects = h.reply(first, "You are safe here.");
        let (second, request) = sent_request(&effects).unwrap();
        assert_ne!(first, second);
        assert_eq!(request.text, "everything is spinning around me");
        assert_eq!(request.turn_index, 2);
        let context: Vec<&str> = request
            .conversation_context
            .iter()
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(
            context,
            vec![
                "my chest feels very tight",
                "I cannot slow my breathing",
                "You are safe here."
            ]
        );
        assert!(!h.orch.dispatcher().has_pending());
    }

    #[test]
    fn test_request_failure_speaks_fallback_without_counting_as_reply() {
        let mut h = Harness::in_dialogue();
        let (request_id, _) = sent_request(&h.say("the light is too bright")).unwrap();
        let generation = h.orch.generation();
        let effects = h.orch.handle(Event::RequestFailed {
            request_id,
            generation,
            failure: DialogueFailure::NetworkFailure("timed out".into()),
        });
        let played = effects.iter().find_map(|e| match e {
            Effect::Play { channel, clip, .. } => Some((*channel, clip.text.clone())),
            _ => None,
        });
        assert_eq!(
            played,
            Some((Channel::Reply, defaults::FALLBACK_TEXT.to_string()))
        );
        assert!(h.orch.session().unwrap().last_response_at.is_none());
    }

    #[test]
    fn test_reply_arriving_during_reply_plays_next() {
        let mut h = Harness::in_dialogue();
        let (a, _) = sent_request(&h.say("my chest feels very tight")).unwrap();
        h.say("I cannot slow my breathing");
        h.advance(1_200);

        let effects = h.reply(a, "Breathe with me.");
        let reply_a = play_token(&effects, Channel::Reply);
        let (b, _) = sent_request(&effects).unwrap();

        h.advance(500);
        let effects = h.reply(b, "Count to four as you breathe in.");
        assert!(effects.iter().all(|e| !matches!(e, Effect::Play { .. })));
        assert!(h.orch.arbiter().has_queued_reply());

        let effects = h.complete(reply_a, Channel::Reply);
        let played = effects.iter().find_map(|e| match e {
            Effect::Play { clip, .. } => Some(clip.text.clone()),
            _ => None,
        });
        assert_eq!(played.as_deref(), Some("Count to four as you breathe in."));
    }

    #[test]
    fn test_echo_of_reply_does_not_interrupt() {
        let mut h = Harness::in_dialogue();
        let (a, _) = sent_request(&h.say("my chest feels very tight")).unwrap();
        let reply = play_token(&h.reply(a, "Breathe with me nice and slow."), Channel::Reply);

        let effects = h.say("breathe with me nice and slow");
        assert!(!has(&effects, &Effect::StopPlayback { token: reply }));
        assert!(sent_request(&effects).is_none());
        assert_eq!(h.orch.arbiter().active_channel(), Some(Channel::Reply));
    }

    #[test]
    fn test_genuine_speech_interrupts_reply() {
        let mut h = Harness::in_dialogue();
        let (a, _) = sent_request(&h.say("my chest feels very tight")).unwrap();
        let reply = play_token(&h.reply(a, "Breathe with me slowly."), Channel::Reply);
        h.advance(1_500);

        let effects = h.say("wait I need to tell you something");
        assert!(has(&effects, &Effect::StopPlayback { token: reply }));
        let (_, request) = sent_request(&effects).unwrap();
        assert_eq!(request.text, "wait I need to tell you something");
    }

    #[test]
    fn test_short_speech_does_not_interrupt_reply() {
        let mut h = Harness::in_dialogue();
        let (a, _) = sent_request(&h.say("my chest feels very tight")).unwrap();
        let reply = play_token(&h.reply(a, "Breathe with me slowly."), Channel::Reply);
        let effects = h.say("okay yes");
        assert!(!has(&effects, &Effect::StopPlayback { token: reply }));
    }

    #[test]
    fn test_end_phrase_ends_session_without_dispatch() {
        let mut h = Harness::in_dialogue();
        let effects = h.say("okay I feel better now thank you");
        assert_eq!(h.orch.phase(), Phase::Ending);
        assert!(sent_request(&effects).is_none());
        assert_eq!(h.orch.session().unwrap().history.len(), 1);
        let closing = play_token(&effects, Channel::Critical);
        assert!(has(&effects, &Effect::PauseCapture));

        let effects = h.complete(closing, Channel::Critical);
        assert_eq!(h.orch.phase(), Phase::Idle);
        assert!(h.orch.session().is_none());
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Notify(SessionNotice::SessionEnded {
                reason: EndReason::EndPhrase { .. },
                turns: 1,
            })
        )));
        assert!(has(&effects, &Effect::StopListening));
    }

    #[test]
    fn test_short_end_phrase_ends_session() {
        let mut h = Harness::in_dialogue();
        let effects = h.say("I'm better");
        assert_eq!(h.orch.phase(), Phase::Ending);
        assert!(sent_request(&effects).is_none());
        assert_eq!(h.orch.session().unwrap().history.len(), 1);

        let closing = play_token(&effects, Channel::Critical);
        let effects = h.complete(closing, Channel::Critical);
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Notify(SessionNotice::SessionEnded {
                reason: EndReason::EndPhrase { phrase },
                turns: 1,
            }) if phrase == "i'm better"
        )));
    }

    #[test]
    fn test_end_phrase_in_repeated_utterance_ends_session() {
        let mut h = Harness::in_dialogue();
        assert!(sent_request(&h.say("my hands feel ok now")).is_some());
        h.advance(1_500);
        h.say("my hands feel ok now i feel ok");
        assert_eq!(h.orch.phase(), Phase::Ending);
        assert_eq!(h.orch.session().unwrap().history.len(), 2);
    }

    #[test]
    fn test_stop_cancels_the_armed_timer_ids() {
        let mut h = Harness::in_dialogue();
        h.orch
            .handle(Event::Transcript(TranscriptUpdate::partial("I keep")));
        let armed: Vec<TimerId> = [
            TimerKind::Silence,
            TimerKind::Inactivity,
            TimerKind::ImageUpdate,
            TimerKind::DetectionCycle,
        ]
        .into_iter()
        .map(|kind| h.orch.armed_timer(kind).unwrap())
        .collect();

        let effects = h.orch.handle(Event::Stop);
        let cancelled: Vec<TimerId> = effects
            .iter()
            .filter_map(|e| match e {
                Effect::CancelTimer { id } => Some(*id),
                _ => None,
            })
            .collect();
        for id in &armed {
            assert!(cancelled.contains(id), "{id:?} not in {cancelled:?}");
        }
    }

    #[test]
    fn test_image_update_captures_context_frame_and_rearms() {
        let mut h = Harness::in_dialogue();
        let first = h.orch.armed_timer(TimerKind::ImageUpdate).unwrap();
        let effects = h.fire(TimerKind::ImageUpdate);

        let frame_id = effects
            .iter()
            .find_map(|e| match e {
                Effect::CaptureFrame {
                    frame_id,
                    purpose: FramePurpose::Context,
                    detection_cycle: None,
                    ..
                } => Some(*frame_id),
                _ => None,
            })
            .unwrap();
        let next = h.orch.armed_timer(TimerKind::ImageUpdate).unwrap();
        assert_ne!(next, first);
        assert!(has(
            &effects,
            &Effect::StartTimer {
                id: next,
                after: Duration::from_millis(crate::defaults::IMAGE_UPDATE_INTERVAL_MS),
            }
        ));

        let generation = h.orch.generation();
        let effects = h.orch.handle(Event::FrameCompleted {
            frame_id,
            generation,
            purpose: FramePurpose::Context,
            detection_cycle: None,
            result: Err(DialogueFailure::CaptureUnavailable("camera not ready".into())),
        });
        assert!(effects.iter().all(|e| !matches!(
            e,
            Effect::Play { .. } | Effect::Notify(SessionNotice::Fallback { .. })
        )));
        assert_eq!(h.orch.phase(), Phase::ContinuousDialogue);
        assert_eq!(h.orch.arbiter().active_channel(), None);
    }

    #[test]
    fn test_image_updates_stop_when_session_ends() {
        let mut h = Harness::in_dialogue();
        let armed = h.orch.armed_timer(TimerKind::ImageUpdate).unwrap();
        h.orch.handle(Event::Stop);
        assert!(h.orch.armed_timer(TimerKind::ImageUpdate).is_none());

        let effects = h.orch.handle(Event::TimerFired(armed));
        assert!(effects.iter().all(|e| !matches!(e, Effect::CaptureFrame { .. })));
    }

    #[test]
    fn test_stop_cancels_request_and_discards_late_reply() {
        let mut h = Harness::in_dialogue();
        let (request_id, _) = sent_request(&h.say("the light is too bright")).unwrap();
        let generation = h.orch.generation();

        let effects = h.orch.handle(Event::Stop);
        assert!(has(&effects, &Effect::CancelRequest { request_id }));
        assert_eq!(h.orch.phase(), Phase::Ending);
        assert!(h.orch.armed_timer(TimerKind::FillerDelay).is_none());
        assert!(h.orch.armed_timer(TimerKind::Inactivity).is_none());
        let closing = play_token(&effects, Channel::Critical);

        let effects = h.orch.handle(Event::RequestSucceeded {
            request_id,
            generation,
            reply: BackendReply {
                text: "late".into(),
                audio: None,
            },
        });
        assert!(effects.iter().all(|e| !matches!(e, Effect::Play { .. })));
        assert_eq!(h.orch.arbiter().active().unwrap().token, closing);
    }

    #[test]
    fn test_stale_timer_from_previous_generation_is_ignored() {
        let mut h = Harness::in_dialogue();
        h.orch
            .handle(Event::Transcript(TranscriptUpdate::partial("I keep")));
        let stale = h.orch.armed_timer(TimerKind::Silence).unwrap();
        h.orch.handle(Event::Stop);
        let effects = h.orch.handle(Event::TimerFired(stale));
        assert!(effects.iter().all(|e| !matches!(e, Effect::SendText { .. })));
    }

    #[test]
    fn test_inactivity_ends_session() {
        let mut h = Harness::in_dialogue();
        h.advance(299_000);
        h.fire(TimerKind::Inactivity);
        assert_eq!(h.orch.phase(), Phase::ContinuousDialogue);

        h.advance(1_000);
        h.fire(TimerKind::Inactivity);
        assert_eq!(h.orch.phase(), Phase::Ending);
    }

    #[test]
    fn test_reply_resets_inactivity() {
        let mut h = Harness::in_dialogue();
        h.advance(200_000);
        let (id, _) = sent_request(&h.say("the light is too bright")).unwrap();
        h.reply(id, "Close your eyes for a moment.");
        h.advance(150_000);
        h.fire(TimerKind::Inactivity);
        assert_eq!(h.orch.phase(), Phase::ContinuousDialogue);
    }

    #[test]
    fn test_detection_cycles_never_overlap() {
        let mut h = Harness::in_dialogue();
        let effects = h.fire(TimerKind::DetectionCycle);
        let cycle = effects.iter().find_map(|e| match e {
            Effect::CaptureFrame {
                detection_cycle, ..
            } => *detection_cycle,
            _ => None,
        });
        assert!(cycle.is_some());

        let effects = h.fire(TimerKind::DetectionCycle);
        assert!(effects
            .iter()
            .all(|e| !matches!(e, Effect::CaptureFrame { .. })));
        assert!(h.orch.detection().is_processing());
    }

    #[test]
    fn test_detection_result_switches_to_interactive_interval() {
        let mut h = Harness::in_dialogue();
        let effects = h.fire(TimerKind::DetectionCycle);
        let (frame_id, cycle) = effects
            .iter()
            .find_map(|e| match e {
                Effect::CaptureFrame {
                    frame_id,
                    detection_cycle: Some(cycle),
                    ..
                } => Some((*frame_id, *cycle)),
                _ => None,
            })
            .unwrap();
        let generation = h.orch.generation();
        let effects = h.orch.handle(Event::FrameCompleted {
            frame_id,
            generation,
            purpose: FramePurpose::Detection,
            detection_cycle: Some(cycle),
            result: Ok(ImageReply {
                frame_id: Some(frame_id),
                objects: vec![DetectedObject {
                    label: "chair".into(),
                    x: 0.3,
                    y: 0.6,
                    confidence: Some(0.9),
                }],
                advisory: None,
            }),
        });
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Notify(SessionNotice::ObjectsDetected { .. })
        )));

        let effects = h.fire(TimerKind::DetectionCycle);
        let interval = effects.iter().find_map(|e| match e {
            Effect::StartTimer { id, after } if id.kind == TimerKind::DetectionCycle => {
                Some(*after)
            }
            _ => None,
        });
        assert_eq!(interval, Some(h.orch.settings.interactive_interval));

        // Replies that mention a detected object are flagged.
        let (id, _) = sent_request(&h.say("what can I look at")).unwrap();
        let effects = h.reply(id, "Look at the chair next to you.");
        assert!(effects.iter().any(|e| e
            == &Effect::Notify(SessionNotice::ObjectsMentioned {
                labels: vec!["chair".into()]
            })));
    }

    #[test]
    fn test_playback_deadline_releases_stuck_channel() {
        let mut h = Harness::in_dialogue();
        let (id, _) = sent_request(&h.say("the light is too bright")).unwrap();
        let token = play_token(&h.reply(id, "Close your eyes."), Channel::Reply);
        h.advance(10_000);
        let effects = h.fire(TimerKind::PlaybackDeadline);
        assert!(has(&effects, &Effect::StopPlayback { token }));
        assert_eq!(h.orch.arbiter().active_channel(), None);
    }

    #[test]
    fn test_throttle_defers_back_to_back_requests() {
        let mut h = Harness::in_dialogue();
        let (a, _) = sent_request(&h.say("my chest feels very tight")).unwrap();
        h.advance(200);
        let reply = play_token(&h.reply(a, "I'm here."), Channel::Reply);
        h.complete(reply, Channel::Reply);
        h.advance(100);
        let effects = h.say("it is getting worse again");
        assert!(sent_request(&effects).is_none());
        assert!(h.orch.armed_timer(TimerKind::Throttle).is_some());
        h.advance(700);
        let effects = h.fire(TimerKind::Throttle);
        assert_eq!(
            sent_request(&effects).unwrap().1.text,
            "it is getting worse again"
        );
    }

    #[test]
    fn test_start_while_running_is_ignored() {
        let mut h = Harness::in_dialogue();
        let effects = h.orch.handle(Event::Start);
        assert!(effects.is_empty());
        assert_eq!(h.orch.phase(), Phase::ContinuousDialogue);
    }
}
