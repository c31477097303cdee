use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout, Instant};
use uuid::Uuid;

use crate::config::PracticeConfig;
use crate::error::{PracticeError, Result};
use crate::media::transport::{AudioClip, PlaybackTransport};
use crate::practice::dictation::{DictationPhase, DictationSession};
use crate::practice::events::SessionUpdate;
use crate::practice::runner::{DictationRunner, ShadowingRunner};
use crate::practice::shadowing::ShadowingSession;
use crate::timing::{PhraseTiming, TimingAccuracy, TimingPlan};
use crate::tts::synthesizer::{SpeechSynthesizer, SynthesisRequest};

struct TransportState {
    media_duration: f64,
    base_position: f64,
    started_at: Option<Instant>,
    rate: f64,
    loaded: Option<Uuid>,
    unloaded: Vec<Uuid>,
    play_calls: usize,
}

impl TransportState {
    fn position(&self) -> f64 {
        let elapsed = self
            .started_at
            .map_or(0.0, |started| started.elapsed().as_secs_f64() * self.rate);
        (self.base_position + elapsed).min(self.media_duration)
    }
}

/// Плеер, позиция которого идёт по часам tokio
struct FakeTransport {
    state: Mutex<TransportState>,
}

impl FakeTransport {
    fn with_track(duration: f64) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(TransportState {
                media_duration: duration,
                base_position: 0.0,
                started_at: None,
                rate: 1.0,
                loaded: None,
                unloaded: Vec::new(),
                play_calls: 0,
            }),
        })
    }

    fn is_playing(&self) -> bool {
        self.state.lock().started_at.is_some()
    }

    fn play_calls(&self) -> usize {
        self.state.lock().play_calls
    }

    fn unloaded_count(&self) -> usize {
        self.state.lock().unloaded.len()
    }
}

impl PlaybackTransport for FakeTransport {
    fn load_clip(&self, clip: &AudioClip) {
        let mut state = self.state.lock();
        state.media_duration = clip.duration;
        state.base_position = 0.0;
        state.started_at = None;
        state.loaded = Some(clip.id);
    }

    fn unload_clip(&self, clip_id: Uuid) {
        let mut state = self.state.lock();
        state.unloaded.push(clip_id);
        if state.loaded == Some(clip_id) {
            state.loaded = None;
        }
    }

    fn play(&self) {
        let mut state = self.state.lock();
        if state.started_at.is_none() {
            state.started_at = Some(Instant::now());
        }
        state.play_calls += 1;
    }

    fn pause(&self) {
        let mut state = self.state.lock();
        state.base_position = state.position();
        state.started_at = None;
    }

    fn seek(&self, position: f64) {
        let mut state = self.state.lock();
        state.base_position = position;
        if state.started_at.is_some() {
            state.started_at = Some(Instant::now());
        }
    }

    fn position(&self) -> f64 {
        self.state.lock().position()
    }

    fn duration(&self) -> f64 {
        self.state.lock().media_duration
    }

    fn is_ended(&self) -> bool {
        let state = self.state.lock();
        state.position() >= state.media_duration
    }

    fn set_playback_rate(&self, rate: f32) {
        let mut state = self.state.lock();
        state.base_position = state.position();
        if state.started_at.is_some() {
            state.started_at = Some(Instant::now());
        }
        state.rate = rate as f64;
    }
}

struct FakeSynthesizer {
    calls: AtomicUsize,
    clip_seconds: f64,
    failing: Vec<String>,
}

impl FakeSynthesizer {
    fn new(clip_seconds: f64, failing: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            clip_seconds,
            failing: failing.iter().map(|s| s.to_string()).collect(),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&request.text) {
            return Err(PracticeError::SynthesisFailure("backend unavailable".to_string()));
        }
        Ok(wav_bytes(self.clip_seconds))
    }
}

/// Создает WAV с тоном заданной длительности
fn wav_bytes(seconds: f64) -> Bytes {
    let sample_rate = 8000;
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        let count = (seconds * sample_rate as f64) as usize;
        for i in 0..count {
            let sample = (i as f32 * 0.05).sin() * 0.5;
            writer.write_sample((sample * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    Bytes::from(cursor.into_inner())
}

fn phrases() -> Vec<String> {
    vec!["One.".to_string(), "Two.".to_string(), "Three.".to_string()]
}

fn plan() -> TimingPlan {
    TimingPlan {
        phrases: phrases(),
        timings: vec![
            PhraseTiming::new(0.0, 1.0),
            PhraseTiming::new(1.3, 2.5),
            PhraseTiming::new(2.8, 4.0),
        ],
        accuracy: TimingAccuracy::SilenceAligned,
        total_duration: 4.0,
    }
}

fn config(loop_count: u32) -> PracticeConfig {
    let mut config = PracticeConfig::default();
    config.shadowing.loop_count = loop_count;
    config.shadowing.gap_multiplier = 1.0;
    config
}

async fn collect_until_completed(rx: &mut broadcast::Receiver<SessionUpdate>) -> Vec<SessionUpdate> {
    let mut updates = Vec::new();
    timeout(Duration::from_secs(300), async {
        loop {
            match rx.recv().await {
                Ok(SessionUpdate::Completed) => break,
                Ok(update) => updates.push(update),
                Err(e) => panic!("event stream failed: {}", e),
            }
        }
    })
    .await
    .expect("session did not complete");
    updates
}

async fn wait_for(rx: &mut broadcast::Receiver<SessionUpdate>, expected: SessionUpdate) {
    timeout(Duration::from_secs(60), async {
        loop {
            if rx.recv().await.unwrap() == expected {
                return;
            }
        }
    })
    .await
    .expect("expected update never arrived");
}

fn started_phrases(updates: &[SessionUpdate]) -> Vec<usize> {
    updates
        .iter()
        .filter_map(|update| match update {
            SessionUpdate::PhraseStarted { index, .. } => Some(*index),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_shadowing_loops_each_phrase_twice() {
    let transport = FakeTransport::with_track(4.0);
    let synthesizer = FakeSynthesizer::new(0.5, &[]);
    let config = config(2);

    let session = ShadowingSession::from_plan(&plan(), config.shadowing.clone());
    let runner = ShadowingRunner::new(session, transport.clone(), synthesizer.clone(), &config);
    let mut updates = runner.subscribe();
    let handle = runner.spawn().unwrap();

    let log = collect_until_completed(&mut updates).await;
    assert_eq!(started_phrases(&log), vec![0, 0, 1, 1, 2, 2]);

    let gaps: Vec<f64> = log
        .iter()
        .filter_map(|update| match update {
            SessionUpdate::GapStarted { duration, .. } => Some(*duration),
            _ => None,
        })
        .collect();
    assert_eq!(gaps.len(), 6);
    assert!((gaps[0] - 1.0).abs() < 1e-9);

    assert_eq!(synthesizer.calls(), 0);
    assert!(!transport.is_playing());
    handle.stop().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shadowing_synthesizes_each_phrase_once() {
    let transport = FakeTransport::with_track(0.0);
    let synthesizer = FakeSynthesizer::new(0.5, &[]);
    let config = config(2);

    let session = ShadowingSession::synthesized(phrases(), config.shadowing.clone());
    let runner = ShadowingRunner::new(session, transport.clone(), synthesizer.clone(), &config);
    let mut updates = runner.subscribe();
    let _handle = runner.spawn().unwrap();

    let log = collect_until_completed(&mut updates).await;
    assert_eq!(started_phrases(&log), vec![0, 0, 1, 1, 2, 2]);
    assert_eq!(synthesizer.calls(), 3);
    assert_eq!(transport.unloaded_count(), 3);

    let first_gap = log.iter().find_map(|update| match update {
        SessionUpdate::GapStarted { duration, .. } => Some(*duration),
        _ => None,
    });
    assert!((first_gap.unwrap() - 0.5).abs() < 1e-3);
}

#[tokio::test(start_paused = true)]
async fn test_shadowing_skips_phrase_when_synthesis_fails() {
    let transport = FakeTransport::with_track(0.0);
    let synthesizer = FakeSynthesizer::new(0.5, &["Two."]);
    let config = config(1);

    let session = ShadowingSession::synthesized(phrases(), config.shadowing.clone());
    let runner = ShadowingRunner::new(session, transport.clone(), synthesizer.clone(), &config);
    let mut updates = runner.subscribe();
    let _handle = runner.spawn().unwrap();

    let log = collect_until_completed(&mut updates).await;
    assert_eq!(started_phrases(&log), vec![0, 2]);
    assert!(log
        .iter()
        .any(|update| matches!(update, SessionUpdate::PhraseSkipped { index: 1, .. })));
}

#[tokio::test(start_paused = true)]
async fn test_shadowing_pause_freezes_session() {
    let transport = FakeTransport::with_track(4.0);
    let synthesizer = FakeSynthesizer::new(0.5, &[]);
    let config = config(1);

    let session = ShadowingSession::from_plan(&plan(), config.shadowing.clone());
    let runner = ShadowingRunner::new(session, transport.clone(), synthesizer, &config);
    let mut updates = runner.subscribe();
    let handle = runner.spawn().unwrap();

    assert_eq!(
        updates.recv().await.unwrap(),
        SessionUpdate::PhraseStarted { index: 0, loop_iteration: 0 }
    );
    handle.pause().unwrap();
    wait_for(&mut updates, SessionUpdate::Paused { index: 0 }).await;

    sleep(Duration::from_secs(30)).await;
    assert!(updates.try_recv().is_err());
    assert!(!transport.is_playing());

    handle.resume().unwrap();
    let log = collect_until_completed(&mut updates).await;
    assert_eq!(log[0], SessionUpdate::Resumed { index: 0 });
    assert_eq!(started_phrases(&log), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_shadowing_jump_restarts_from_target() {
    let transport = FakeTransport::with_track(4.0);
    let synthesizer = FakeSynthesizer::new(0.5, &[]);
    let config = config(1);

    let session = ShadowingSession::from_plan(&plan(), config.shadowing.clone());
    let runner = ShadowingRunner::new(session, transport.clone(), synthesizer, &config);
    let mut updates = runner.subscribe();
    let handle = runner.spawn().unwrap();

    updates.recv().await.unwrap();
    handle.jump_to(2).unwrap();

    let log = collect_until_completed(&mut updates).await;
    assert_eq!(started_phrases(&log), vec![2]);
}

async fn next_started(rx: &mut broadcast::Receiver<SessionUpdate>) -> usize {
    timeout(Duration::from_secs(60), async {
        loop {
            if let SessionUpdate::PhraseStarted { index, .. } = rx.recv().await.unwrap() {
                return index;
            }
        }
    })
    .await
    .expect("no phrase started")
}

#[tokio::test(start_paused = true)]
async fn test_shadowing_pause_during_gap_cancels_timer() {
    let transport = FakeTransport::with_track(4.0);
    let synthesizer = FakeSynthesizer::new(0.5, &[]);
    let config = config(1);

    let session = ShadowingSession::from_plan(&plan(), config.shadowing.clone());
    let runner = ShadowingRunner::new(session, transport.clone(), synthesizer, &config);
    let mut updates = runner.subscribe();
    let handle = runner.spawn().unwrap();

    wait_for(&mut updates, SessionUpdate::GapStarted { index: 0, duration: 1.0 }).await;
    handle.pause().unwrap();
    wait_for(&mut updates, SessionUpdate::Paused { index: 0 }).await;

    // Таймер паузы отменён: фраза 1 не должна начаться
    sleep(Duration::from_secs(30)).await;
    assert!(updates.try_recv().is_err());
    assert!(!transport.is_playing());

    let resumed_at = Instant::now();
    handle.resume().unwrap();
    assert_eq!(updates.recv().await.unwrap(), SessionUpdate::Resumed { index: 0 });
    assert_eq!(
        updates.recv().await.unwrap(),
        SessionUpdate::GapStarted { index: 0, duration: 1.0 }
    );
    assert_eq!(next_started(&mut updates).await, 1);
    assert!(resumed_at.elapsed() >= Duration::from_secs(1));

    let log = collect_until_completed(&mut updates).await;
    assert_eq!(started_phrases(&log), vec![2]);
    handle.stop().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shadowing_jump_during_gap() {
    let transport = FakeTransport::with_track(4.0);
    let synthesizer = FakeSynthesizer::new(0.5, &[]);
    let config = config(1);

    let session = ShadowingSession::from_plan(&plan(), config.shadowing.clone());
    let runner = ShadowingRunner::new(session, transport.clone(), synthesizer, &config);
    let mut updates = runner.subscribe();
    let handle = runner.spawn().unwrap();

    wait_for(&mut updates, SessionUpdate::GapStarted { index: 0, duration: 1.0 }).await;
    handle.jump_to(2).unwrap();
    assert_eq!(next_started(&mut updates).await, 2);

    let log = collect_until_completed(&mut updates).await;
    assert!(started_phrases(&log).is_empty());

    // Старый таймер паузы фразы 0 не переключает сессию на фразу 1
    sleep(Duration::from_secs(30)).await;
    assert!(updates.try_recv().is_err());
    assert!(!transport.is_playing());
    handle.stop().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shadowing_stop_ends_runner() {
    let transport = FakeTransport::with_track(4.0);
    let synthesizer = FakeSynthesizer::new(0.5, &[]);
    let config = config(0);

    let session = ShadowingSession::from_plan(&plan(), config.shadowing.clone());
    let runner = ShadowingRunner::new(session, transport.clone(), synthesizer, &config);
    let mut updates = runner.subscribe();
    let handle = runner.spawn().unwrap();

    sleep(Duration::from_secs(5)).await;
    handle.stop().unwrap();
    wait_for(&mut updates, SessionUpdate::Stopped).await;
    sleep(Duration::from_millis(10)).await;

    assert!(!handle.is_running());
    assert!(handle.next().is_err());
    assert!(!transport.is_playing());
}

#[tokio::test]
async fn test_shadowing_without_phrases_does_not_start() {
    let transport = FakeTransport::with_track(4.0);
    let synthesizer = FakeSynthesizer::new(0.5, &[]);
    let config = config(1);

    let session = ShadowingSession::synthesized(Vec::new(), config.shadowing.clone());
    let runner = ShadowingRunner::new(session, transport, synthesizer, &config);
    assert!(matches!(runner.spawn(), Err(PracticeError::EmptyInput(_))));
}

#[tokio::test(start_paused = true)]
async fn test_dictation_play_beyond_budget_does_not_synthesize() {
    let transport = FakeTransport::with_track(0.0);
    let synthesizer = FakeSynthesizer::new(0.5, &[]);
    let mut config = PracticeConfig::default();
    config.dictation.max_replays = 2;

    let session = DictationSession::synthesized(phrases(), config.dictation.clone(), config.scoring.clone());
    let mut runner = DictationRunner::new(session, transport.clone(), synthesizer.clone(), &config);
    runner.start().await.unwrap();

    runner.play().await.unwrap();
    assert_eq!(synthesizer.calls(), 1);
    assert_eq!(transport.play_calls(), 1);

    runner.play().await.unwrap();
    assert_eq!(synthesizer.calls(), 1);
    assert_eq!(transport.play_calls(), 2);

    runner.play().await.unwrap();
    assert_eq!(synthesizer.calls(), 1);
    assert_eq!(transport.play_calls(), 2);
    assert_eq!(runner.session().replays_left(), 0);

    runner.replay_reference().await.unwrap();
    assert_eq!(transport.play_calls(), 3);
    assert_eq!(synthesizer.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dictation_synthesis_failure_is_surfaced() {
    let transport = FakeTransport::with_track(0.0);
    let synthesizer = FakeSynthesizer::new(0.5, &["One."]);
    let config = PracticeConfig::default();

    let session = DictationSession::synthesized(phrases(), config.dictation.clone(), config.scoring.clone());
    let mut runner = DictationRunner::new(session, transport.clone(), synthesizer.clone(), &config);
    runner.start().await.unwrap();

    let err = runner.play().await.unwrap_err();
    assert!(matches!(err, PracticeError::SynthesisFailure(_)));
    assert_eq!(runner.session().replays_left(), config.dictation.max_replays);
    assert_eq!(transport.play_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dictation_segment_stops_at_phrase_end() {
    let transport = FakeTransport::with_track(4.0);
    let synthesizer = FakeSynthesizer::new(0.5, &[]);
    let config = PracticeConfig::default();

    let session = DictationSession::from_plan(&plan(), config.dictation.clone(), config.scoring.clone());
    let mut runner = DictationRunner::new(session, transport.clone(), synthesizer.clone(), &config);
    runner.start().await.unwrap();

    runner.play().await.unwrap();
    assert!(transport.is_playing());

    sleep(Duration::from_secs(3)).await;
    assert!(!transport.is_playing());
    let position = transport.position();
    assert!((1.0..1.1).contains(&position), "stopped at {}", position);
    assert_eq!(synthesizer.calls(), 0);
}

#[tokio::test]
async fn test_dictation_full_run_reports_scores() {
    let transport = FakeTransport::with_track(4.0);
    let synthesizer = FakeSynthesizer::new(0.5, &[]);
    let config = PracticeConfig::default();

    let session = DictationSession::from_plan(&plan(), config.dictation.clone(), config.scoring.clone());
    let mut runner = DictationRunner::new(session, transport, synthesizer, &config);
    let mut updates = runner.subscribe();
    runner.start().await.unwrap();

    assert_eq!(runner.submit("one").unwrap().score, 100);
    runner.next().await.unwrap();
    runner.skip().await.unwrap();
    assert_eq!(runner.submit("three").unwrap().score, 100);
    runner.next().await.unwrap();

    let mut scores = Vec::new();
    loop {
        match updates.recv().await.unwrap() {
            SessionUpdate::Scored { index, result } => scores.push((index, result.score)),
            SessionUpdate::Completed => break,
            _ => {}
        }
    }
    assert_eq!(scores, vec![(0, 100), (1, 0), (2, 100)]);

    let summary = runner.summary();
    assert_eq!(summary.total_correct, 2);
    assert!((summary.average_score - 200.0 / 3.0).abs() < 1e-9);

    runner.stop().await.unwrap();
    assert_eq!(runner.session().phase(), DictationPhase::Idle);
}
