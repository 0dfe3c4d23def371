//! End-to-end session tests: the real runtime with mock collaborators under
//! paused tokio time.

use grounded::audio::{Channel, ClipLibrary, RecordingPlayback};
use grounded::capture::{ChannelCapture, TranscriptUpdate};
use grounded::clock::TokioClock;
use grounded::defaults;
use grounded::detection::DetectedObject;
use grounded::dispatch::{ImageReply, MockBackend};
use grounded::error::DialogueFailure;
use grounded::orchestrator::{
    Collaborators, Orchestrator, OrchestratorSettings, RuntimeSettings, SessionHandle,
    SessionNotice, SessionRuntime,
};
use grounded::session::{EndReason, Phase};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

struct Rig {
    session: SessionHandle,
    capture: Arc<ChannelCapture>,
    backend: Arc<MockBackend>,
    playback: Arc<RecordingPlayback>,
    notices: broadcast::Receiver<SessionNotice>,
    seen: Vec<SessionNotice>,
}

impl Rig {
    fn new(backend: MockBackend) -> Self {
        Self::with_settings(backend, RuntimeSettings::default())
    }

    fn with_settings(backend: MockBackend, settings: RuntimeSettings) -> Self {
        let backend = Arc::new(backend);
        let playback = Arc::new(RecordingPlayback::new());
        let capture = Arc::new(ChannelCapture::new().with_frame(vec![0xFF, 0xD8, 0xFF, 0xE0]));
        let collaborators = Collaborators {
            backend: backend.clone(),
            playback: playback.clone(),
            capture: capture.clone(),
        };
        let orchestrator = Orchestrator::with_clock(
            OrchestratorSettings::default(),
            ClipLibrary::default(),
            TokioClock,
        );
        let session = SessionRuntime::spawn(orchestrator, collaborators, settings);
        let notices = session.subscribe();
        Self {
            session,
            capture,
            backend,
            playback,
            notices,
            seen: Vec::new(),
        }
    }

    /// Start a session and wait past the opening announcement.
    async fn open(&mut self) {
        self.session.start().unwrap();
        sleep_ms(defaults::OPENING_ANNOUNCEMENT_MS + 1_500).await;
        assert_eq!(self.session.status().phase, Phase::ContinuousDialogue);
    }

    fn say(&self, text: &str) {
        assert!(
            self.capture.push(TranscriptUpdate::final_text(text)),
            "capture refused {text:?}"
        );
    }

    fn drain(&mut self) -> &[SessionNotice] {
        while let Ok(notice) = self.notices.try_recv() {
            self.seen.push(notice);
        }
        &self.seen
    }

    fn started_channels(&mut self) -> Vec<Channel> {
        self.drain()
            .iter()
            .filter_map(|n| match n {
                SessionNotice::PlaybackStarted { channel, .. } => Some(*channel),
                _ => None,
            })
            .collect()
    }

    fn ended(&mut self) -> Option<(EndReason, usize)> {
        self.drain().iter().find_map(|n| match n {
            SessionNotice::SessionEnded { reason, turns } => Some((reason.clone(), *turns)),
            _ => None,
        })
    }
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn test_opening_then_filler_then_reply() {
    let reply = "Let's dim the lights together.";
    let mut rig = Rig::new(MockBackend::new().with_reply(reply, Duration::from_millis(2_500)));

    rig.session.start().unwrap();
    sleep_ms(100).await;
    let status = rig.session.status();
    assert_eq!(status.phase, Phase::Initializing);
    assert_eq!(status.channel, Some(Channel::Critical));
    assert!(!status.listening);

    sleep_ms(defaults::OPENING_ANNOUNCEMENT_MS).await;
    let status = rig.session.status();
    assert_eq!(status.phase, Phase::ContinuousDialogue);
    assert_eq!(status.channel, None);
    assert!(status.listening);

    rig.say("the light is too bright");
    sleep_ms(10_000).await;

    assert_eq!(
        rig.started_channels(),
        vec![Channel::Critical, Channel::Filler, Channel::Reply]
    );
    let requests = rig.backend.text_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].text, "the light is too bright");
    assert_eq!(requests[0].turn_index, 1);

    let played = rig.playback.played_texts();
    assert_eq!(played.first().map(String::as_str), Some(defaults::OPENING_TEXT));
    assert_eq!(played.last().map(String::as_str), Some(reply));

    let status = rig.session.status();
    assert_eq!(status.channel, None);
    assert!(status.listening);
    assert!(!rig.capture.is_paused());
    assert_eq!(status.turns, 2);
}

#[tokio::test(start_paused = true)]
async fn test_fast_reply_never_plays_filler() {
    let mut rig = Rig::new(
        MockBackend::new().with_reply("I'm listening. Go on.", Duration::from_millis(500)),
    );
    rig.open().await;

    rig.say("my hands will not stop shaking");
    sleep_ms(6_000).await;

    let channels = rig.started_channels();
    assert!(!channels.contains(&Channel::Filler), "{channels:?}");
    assert_eq!(channels.last(), Some(&Channel::Reply));
}

#[tokio::test(start_paused = true)]
async fn test_latest_utterance_wins_while_request_in_flight() {
    let mut rig = Rig::new(
        MockBackend::new()
            .with_reply("You are safe here.", Duration::from_millis(3_000))
            .with_reply("Let's count five things you can see.", Duration::from_millis(300)),
    );
    rig.open().await;

    rig.say("my chest feels very tight");
    sleep_ms(300).await;
    rig.say("I cannot slow my breathing");
    sleep_ms(300).await;
    rig.say("everything is spinning around me");
    sleep_ms(12_000).await;

    let texts: Vec<String> = rig
        .backend
        .text_requests()
        .into_iter()
        .map(|r| r.text)
        .collect();
    assert_eq!(
        texts,
        vec![
            "my chest feels very tight".to_string(),
            "everything is spinning around me".to_string(),
        ]
    );
    let second = &rig.backend.text_requests()[1];
    assert_eq!(second.turn_index, 2);
    assert!(
        second
            .conversation_context
            .iter()
            .any(|turn| turn.text == "You are safe here.")
    );
}

#[tokio::test(start_paused = true)]
async fn test_backend_failure_speaks_fallback() {
    let mut rig = Rig::new(MockBackend::new().with_failure(
        DialogueFailure::NetworkFailure("connection refused".to_string()),
        Duration::from_millis(200),
    ));
    rig.open().await;

    rig.say("I do not know where I am");
    sleep_ms(15_000).await;

    assert!(
        rig.playback
            .played_texts()
            .contains(&defaults::FALLBACK_TEXT.to_string())
    );
    assert!(
        rig.drain()
            .iter()
            .any(|n| matches!(n, SessionNotice::Fallback { .. }))
    );
    assert_eq!(rig.session.status().phase, Phase::ContinuousDialogue);
}

#[tokio::test(start_paused = true)]
async fn test_slow_backend_times_out_into_fallback() {
    let settings = RuntimeSettings {
        text_timeout: Duration::from_secs(2),
        image_timeout: Duration::from_secs(1),
    };
    let mut rig = Rig::with_settings(
        MockBackend::new().with_reply("far too late", Duration::from_secs(20)),
        settings,
    );
    rig.open().await;

    rig.say("is anyone still there with me");
    sleep_ms(15_000).await;

    let played = rig.playback.played_texts();
    assert!(played.contains(&defaults::FALLBACK_TEXT.to_string()));
    assert!(!played.contains(&"far too late".to_string()));
    assert!(rig.drain().iter().any(|n| matches!(
        n,
        SessionNotice::Fallback { failure } if failure.contains("network failure")
    )));
}

#[tokio::test(start_paused = true)]
async fn test_stop_discards_in_flight_reply() {
    let late = "This reply arrives after the session ended.";
    let mut rig = Rig::new(MockBackend::new().with_reply(late, Duration::from_secs(5)));
    rig.open().await;

    rig.say("please just make it stop");
    sleep_ms(500).await;
    rig.session.stop().unwrap();
    sleep_ms(20_000).await;

    assert_eq!(rig.ended(), Some((EndReason::Stopped, 1)));
    assert_eq!(rig.session.status().phase, Phase::Idle);
    let played = rig.playback.played_texts();
    assert!(!played.contains(&late.to_string()));
    assert_eq!(played.last().map(String::as_str), Some(defaults::CLOSING_TEXT));
    assert!(
        !rig.drain()
            .iter()
            .any(|n| matches!(n, SessionNotice::ReplyReceived { .. }))
    );
}

#[tokio::test(start_paused = true)]
async fn test_inactivity_ends_session() {
    let mut rig = Rig::new(MockBackend::new());
    rig.open().await;

    sleep_ms(defaults::INACTIVITY_TIMEOUT_SECS * 1_000 - 10_000).await;
    assert_eq!(rig.session.status().phase, Phase::ContinuousDialogue);

    sleep_ms(30_000).await;
    assert_eq!(rig.ended(), Some((EndReason::Inactivity, 0)));
    assert_eq!(rig.session.status().phase, Phase::Idle);
    assert!(!rig.capture.is_streaming());
}

#[tokio::test(start_paused = true)]
async fn test_end_phrase_closes_session() {
    let mut rig = Rig::new(MockBackend::new());
    rig.open().await;

    rig.say("okay I feel better now thank you");
    sleep_ms(15_000).await;

    assert!(rig.backend.text_requests().is_empty());
    match rig.ended() {
        Some((EndReason::EndPhrase { .. }, turns)) => assert_eq!(turns, 1),
        other => panic!("expected end-phrase ending, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_detected_objects_are_matched_in_replies() {
    let lamp = DetectedObject {
        label: "lamp".to_string(),
        x: 0.2,
        y: 0.4,
        confidence: Some(0.8),
    };
    let backend = MockBackend::new()
        .with_image_reply(
            ImageReply {
                objects: vec![lamp],
                ..ImageReply::default()
            },
            Duration::from_millis(100),
        )
        .with_reply("Can you describe the lamp near you?", Duration::from_millis(400));
    let mut rig = Rig::new(backend);
    rig.open().await;

    assert!(!rig.backend.image_requests().is_empty());
    rig.say("I am sitting in my room");
    sleep_ms(8_000).await;

    let notices = rig.drain();
    assert!(notices.iter().any(|n| matches!(
        n,
        SessionNotice::ObjectsDetected { labels } if labels == &vec!["lamp".to_string()]
    )));
    assert!(notices.iter().any(|n| matches!(
        n,
        SessionNotice::ObjectsMentioned { labels } if labels == &vec!["lamp".to_string()]
    )));
}

#[tokio::test(start_paused = true)]
async fn test_session_can_restart_after_ending() {
    let mut rig = Rig::new(MockBackend::new());
    rig.open().await;
    rig.session.stop().unwrap();
    sleep_ms(20_000).await;
    assert_eq!(rig.session.status().phase, Phase::Idle);

    rig.open().await;
    rig.say("I am back again and still scared");
    sleep_ms(5_000).await;
    assert_eq!(rig.backend.text_requests().len(), 1);
    assert_eq!(rig.backend.text_requests()[0].turn_index, 1);

    rig.session.shutdown().await;
}
