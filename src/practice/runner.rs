//! Исполнители практических сессий
//!
//! Раннер связывает конечный автомат сессии с внешним миром: выполняет
//! директивы на транспорте воспроизведения, обращается к синтезатору речи
//! и следит за позицией воспроизведения через [`Scheduler`].
//!
//! Shadowing runs as an actor task: user controls and internal events
//! (phrase ended, gap elapsed, clip ready) go through one queue, so each
//! transition runs to completion before the next one starts. Events carry
//! the scheduler epoch they were scheduled in and are dropped once a
//! cancellation made them stale.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, error, info, warn};
use tokio::sync::{broadcast, mpsc};

use crate::config::{PlaybackConfig, PracticeConfig, VoiceConfig};
use crate::error::{PracticeError, Result};
use crate::media::decoder::decode_audio_bytes;
use crate::media::transport::{AudioClip, PlaybackTransport};
use crate::practice::dictation::{DictationSession, DictationSummary};
use crate::practice::events::{SessionEvents, SessionUpdate};
use crate::practice::scheduler::{Scheduler, WaitCondition, WaitOutcome};
use crate::practice::shadowing::ShadowingSession;
use crate::practice::Directive;
use crate::text::scorer::ScoreResult;
use crate::tts::synthesizer::{SpeechSynthesizer, SynthesisRequest};

/// Запас сверх оставшейся длительности клипа, после которого клип считается доигранным
const CLIP_END_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShadowingControl {
    JumpTo(usize),
    Next,
    Previous,
    Pause,
    Resume,
    Stop,
}

enum RunnerEvent {
    Control(ShadowingControl),
    PhraseEnded {
        epoch: u64,
        index: usize,
    },
    GapElapsed {
        epoch: u64,
        index: usize,
    },
    ClipReady {
        epoch: u64,
        index: usize,
        bytes: Bytes,
        duration: Option<f64>,
    },
    SynthesisFailed {
        epoch: u64,
        index: usize,
        reason: String,
    },
}

impl RunnerEvent {
    /// Epoch of internal events; controls are never stale.
    fn epoch(&self) -> Option<u64> {
        match self {
            RunnerEvent::Control(_) => None,
            RunnerEvent::PhraseEnded { epoch, .. }
            | RunnerEvent::GapElapsed { epoch, .. }
            | RunnerEvent::ClipReady { epoch, .. }
            | RunnerEvent::SynthesisFailed { epoch, .. } => Some(*epoch),
        }
    }
}

type EventSender = mpsc::WeakUnboundedSender<RunnerEvent>;

fn send(tx: &EventSender, event: RunnerEvent) {
    // Раннер уже остановлен, если все отправители закрыты
    if let Some(tx) = tx.upgrade() {
        let _ = tx.send(event);
    }
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}

/// Decodes a synthesized clip to learn its duration.
async fn clip_duration(bytes: Bytes) -> Option<f64> {
    match tokio::task::spawn_blocking(move || decode_audio_bytes(&bytes)).await {
        Ok(Ok(audio)) => Some(audio.duration),
        Ok(Err(e)) => {
            warn!("Cannot measure synthesized clip: {}", e);
            None
        }
        Err(e) => {
            error!("Clip decoding task failed: {}", e);
            None
        }
    }
}

/// The one synthesized clip a session owns at a time.
#[derive(Default)]
struct ClipSlot {
    clip: Option<AudioClip>,
}

impl ClipSlot {
    /// Loads the clip into the transport and returns its duration.
    fn install(
        &mut self,
        transport: &dyn PlaybackTransport,
        index: usize,
        bytes: Bytes,
        duration: Option<f64>,
    ) -> f64 {
        self.release(transport);

        let mut clip = AudioClip::new(index, bytes, duration.unwrap_or(0.0));
        transport.load_clip(&clip);
        if duration.is_none() {
            clip.duration = transport.duration();
        }
        debug!("Loaded clip {} for phrase {} ({:.2}s)", clip.id, index, clip.duration);

        let duration = clip.duration;
        self.clip = Some(clip);
        duration
    }

    fn release(&mut self, transport: &dyn PlaybackTransport) {
        if let Some(clip) = self.clip.take() {
            debug!("Releasing clip {} of phrase {}", clip.id, clip.index);
            transport.unload_clip(clip.id);
        }
    }

    fn duration(&self) -> f64 {
        self.clip.as_ref().map_or(0.0, |c| c.duration)
    }
}

/// Controls a shadowing session running in the background.
#[derive(Clone)]
pub struct ShadowingHandle {
    tx: mpsc::UnboundedSender<RunnerEvent>,
    events: SessionEvents,
}

impl ShadowingHandle {
    pub fn jump_to(&self, index: usize) -> Result<()> {
        self.send(ShadowingControl::JumpTo(index))
    }

    pub fn next(&self) -> Result<()> {
        self.send(ShadowingControl::Next)
    }

    pub fn previous(&self) -> Result<()> {
        self.send(ShadowingControl::Previous)
    }

    pub fn pause(&self) -> Result<()> {
        self.send(ShadowingControl::Pause)
    }

    pub fn resume(&self) -> Result<()> {
        self.send(ShadowingControl::Resume)
    }

    /// Stops the session and ends the runner task.
    pub fn stop(&self) -> Result<()> {
        self.send(ShadowingControl::Stop)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    fn send(&self, control: ShadowingControl) -> Result<()> {
        self.tx
            .send(RunnerEvent::Control(control))
            .map_err(|_| PracticeError::Other("shadowing session is not running".to_string()))
    }
}

/// Drives a [`ShadowingSession`] against a transport and a speech backend.
pub struct ShadowingRunner {
    session: ShadowingSession,
    transport: Arc<dyn PlaybackTransport>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    voice: VoiceConfig,
    playback: PlaybackConfig,
    scheduler: Scheduler,
    events: SessionEvents,
    clip: ClipSlot,
}

impl ShadowingRunner {
    pub fn new(
        session: ShadowingSession,
        transport: Arc<dyn PlaybackTransport>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        config: &PracticeConfig,
    ) -> Self {
        Self {
            session,
            transport,
            synthesizer,
            voice: config.voice.clone(),
            playback: config.playback.clone(),
            scheduler: Scheduler::new(),
            events: SessionEvents::new(),
            clip: ClipSlot::default(),
        }
    }

    /// Subscribe before [`spawn`](Self::spawn) to see the first phrase start.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.events.subscribe()
    }

    /// Starts the session and moves the runner onto its own task.
    ///
    /// Fails with [`PracticeError::EmptyInput`] when there is nothing to play.
    /// The task ends on `stop` or once every handle is dropped.
    pub fn spawn(mut self) -> Result<ShadowingHandle> {
        let (tx, rx) = mpsc::unbounded_channel();
        let weak = tx.downgrade();

        self.transport.set_playback_rate(self.playback.speed);
        let directives = self.session.start()?;
        self.execute(directives, &weak);

        let handle = ShadowingHandle {
            tx,
            events: self.events.clone(),
        };
        tokio::spawn(self.run(rx, weak));
        Ok(handle)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<RunnerEvent>, weak: EventSender) {
        while let Some(event) = rx.recv().await {
            if let Some(epoch) = event.epoch() {
                if epoch != self.scheduler.epoch() {
                    debug!("Dropping stale session event from epoch {}", epoch);
                    continue;
                }
            }

            let directives = match event {
                RunnerEvent::Control(ShadowingControl::Stop) => break,
                RunnerEvent::Control(control) => self.apply_control(control),
                RunnerEvent::PhraseEnded { index, .. } => self.session.on_phrase_ended(index),
                RunnerEvent::GapElapsed { index, .. } => self.session.on_gap_elapsed(index),
                RunnerEvent::ClipReady {
                    index,
                    bytes,
                    duration,
                    ..
                } => {
                    let duration = self.clip.install(self.transport.as_ref(), index, bytes, duration);
                    self.session.on_clip_ready(index, duration)
                }
                RunnerEvent::SynthesisFailed { index, reason, .. } => {
                    warn!("Synthesis failed for phrase {}: {}", index, reason);
                    self.events.notify(SessionUpdate::PhraseSkipped { index, reason });
                    self.session.on_synthesis_failed(index)
                }
            };
            self.execute(directives, &weak);
        }

        let directives = self.session.stop();
        self.execute(directives, &weak);
        self.events.notify(SessionUpdate::Stopped);
        info!("Shadowing runner finished");
    }

    fn apply_control(&mut self, control: ShadowingControl) -> Vec<Directive> {
        debug!("Shadowing control {:?}", control);
        match control {
            ShadowingControl::JumpTo(index) => self.session.jump_to(index),
            ShadowingControl::Next => self.session.next(),
            ShadowingControl::Previous => self.session.previous(),
            ShadowingControl::Pause => {
                let directives = self.session.pause();
                if !directives.is_empty() {
                    self.events.notify(SessionUpdate::Paused {
                        index: self.session.current_index(),
                    });
                }
                directives
            }
            ShadowingControl::Resume => {
                let directives = self.session.resume();
                if !directives.is_empty() {
                    self.events.notify(SessionUpdate::Resumed {
                        index: self.session.current_index(),
                    });
                }
                directives
            }
            ShadowingControl::Stop => self.session.stop(),
        }
    }

    fn execute(&mut self, directives: Vec<Directive>, weak: &EventSender) {
        for directive in directives {
            debug!("Executing {:?}", directive);
            match directive {
                Directive::PlaySegment { index, start, end } => {
                    self.transport.seek(start);
                    self.transport.play();
                    self.notify_started(index);
                    self.watch_segment(index, end, weak);
                }
                Directive::ResumeSegment { index, end } => {
                    self.transport.play();
                    self.watch_segment(index, end, weak);
                }
                Directive::Synthesize { index, text } => self.request_clip(index, text, weak),
                Directive::PlayClip { index } => {
                    self.transport.seek(0.0);
                    self.transport.play();
                    self.notify_started(index);
                    self.watch_clip(index, weak);
                }
                Directive::ResumeClip { index } => {
                    self.transport.play();
                    self.watch_clip(index, weak);
                }
                Directive::StartGap { index, duration } => {
                    self.transport.pause();
                    self.events.notify(SessionUpdate::GapStarted { index, duration });

                    let epoch = self.scheduler.epoch();
                    let tx = weak.clone();
                    self.scheduler
                        .spawn(WaitCondition::after(seconds(duration)), move |outcome| {
                            if outcome == WaitOutcome::Elapsed {
                                send(&tx, RunnerEvent::GapElapsed { epoch, index });
                            }
                        });
                }
                Directive::CancelPending => {
                    self.scheduler.cancel_all();
                    self.transport.pause();
                }
                Directive::ReleaseClip => self.clip.release(self.transport.as_ref()),
                Directive::Completed => {
                    self.transport.pause();
                    self.events.notify(SessionUpdate::Completed);
                }
            }
        }
    }

    fn notify_started(&self, index: usize) {
        self.events.notify(SessionUpdate::PhraseStarted {
            index,
            loop_iteration: self.session.loop_iteration(),
        });
    }

    /// Source track: the phrase ends when the position passes `end`.
    fn watch_segment(&self, index: usize, end: f64, weak: &EventSender) {
        let transport = Arc::clone(&self.transport);
        let epoch = self.scheduler.epoch();
        let tx = weak.clone();

        self.scheduler.spawn(
            WaitCondition::until(
                move || transport.position() >= end || transport.is_ended(),
                self.playback.poll_interval(),
            ),
            move |outcome| {
                if outcome == WaitOutcome::Reached {
                    send(&tx, RunnerEvent::PhraseEnded { epoch, index });
                }
            },
        );
    }

    /// Synthesized clip: the phrase ends with the clip, or once its remaining
    /// duration has clearly passed.
    fn watch_clip(&self, index: usize, weak: &EventSender) {
        let remaining = (self.clip.duration() - self.transport.position()).max(0.0);
        let timeout = seconds(remaining / self.playback.speed as f64) + CLIP_END_GRACE;
        let transport = Arc::clone(&self.transport);
        let epoch = self.scheduler.epoch();
        let tx = weak.clone();

        self.scheduler.spawn(
            WaitCondition::until_or_after(move || transport.is_ended(), self.playback.poll_interval(), timeout),
            move |outcome| {
                if outcome != WaitOutcome::Cancelled {
                    send(&tx, RunnerEvent::PhraseEnded { epoch, index });
                }
            },
        );
    }

    fn request_clip(&self, index: usize, text: String, weak: &EventSender) {
        info!("Synthesizing phrase {}", index);
        let request = SynthesisRequest::from_voice(text, &self.voice);
        let synthesizer = Arc::clone(&self.synthesizer);
        let token = self.scheduler.token();
        let epoch = self.scheduler.epoch();
        let tx = weak.clone();

        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("Synthesis of phrase {} cancelled", index);
                    return;
                }
                result = synthesizer.synthesize(&request) => result,
            };

            let event = match result {
                Ok(bytes) => {
                    let duration = clip_duration(bytes.clone()).await;
                    RunnerEvent::ClipReady {
                        epoch,
                        index,
                        bytes,
                        duration,
                    }
                }
                Err(e) => RunnerEvent::SynthesisFailed {
                    epoch,
                    index,
                    reason: e.to_string(),
                },
            };
            send(&tx, event);
        });
    }
}

/// Executes a [`DictationSession`] against a transport and a speech backend.
///
/// Every call runs its transition to completion, so no queue is needed:
/// the caller owns the runner exclusively.
pub struct DictationRunner {
    session: DictationSession,
    transport: Arc<dyn PlaybackTransport>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    voice: VoiceConfig,
    playback: PlaybackConfig,
    scheduler: Arc<Scheduler>,
    events: SessionEvents,
    clip: ClipSlot,
}

impl DictationRunner {
    pub fn new(
        session: DictationSession,
        transport: Arc<dyn PlaybackTransport>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        config: &PracticeConfig,
    ) -> Self {
        Self {
            session,
            transport,
            synthesizer,
            voice: config.voice.clone(),
            playback: config.playback.clone(),
            scheduler: Arc::new(Scheduler::new()),
            events: SessionEvents::new(),
            clip: ClipSlot::default(),
        }
    }

    pub fn session(&self) -> &DictationSession {
        &self.session
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.events.subscribe()
    }

    pub async fn start(&mut self) -> Result<()> {
        self.transport.set_playback_rate(self.playback.speed);
        let directives = self.session.start()?;
        self.execute(directives).await
    }

    /// Plays the current phrase if replays are left.
    ///
    /// A synthesis failure is returned to the caller and does not use up a replay.
    pub async fn play(&mut self) -> Result<()> {
        let directives = self.session.play();
        self.execute(directives).await
    }

    pub async fn replay_reference(&mut self) -> Result<()> {
        let directives = self.session.replay_reference();
        self.execute(directives).await
    }

    pub fn submit(&mut self, answer: &str) -> Option<ScoreResult> {
        let index = self.session.current_index();
        let result = self.session.submit(answer)?;
        self.events.notify(SessionUpdate::Scored {
            index,
            result: result.clone(),
        });
        Some(result)
    }

    pub async fn skip(&mut self) -> Result<()> {
        let index = self.session.current_index();
        let recorded = self.session.scores().len();
        let reference = self.session.current_phrase().map(str::to_string);

        let directives = self.session.skip();
        if self.session.scores().len() > recorded {
            if let Some(reference) = reference {
                self.events.notify(SessionUpdate::Scored {
                    index,
                    result: ScoreResult::skipped(&reference),
                });
            }
        }
        self.execute(directives).await
    }

    pub async fn next(&mut self) -> Result<()> {
        let directives = self.session.next();
        self.execute(directives).await
    }

    pub async fn restart(&mut self) -> Result<()> {
        let directives = self.session.restart();
        self.execute(directives).await
    }

    pub async fn stop(&mut self) -> Result<()> {
        let directives = self.session.stop();
        self.execute(directives).await?;
        self.events.notify(SessionUpdate::Stopped);
        Ok(())
    }

    pub fn summary(&self) -> DictationSummary {
        self.session.summary()
    }

    async fn execute(&mut self, directives: Vec<Directive>) -> Result<()> {
        let mut queue: VecDeque<Directive> = directives.into();

        while let Some(directive) = queue.pop_front() {
            debug!("Executing {:?}", directive);
            match directive {
                Directive::PlaySegment { start, end, .. } => {
                    self.transport.seek(start);
                    self.transport.play();
                    self.stop_at(end);
                }
                Directive::ResumeSegment { end, .. } => {
                    self.transport.play();
                    self.stop_at(end);
                }
                Directive::Synthesize { index, text } => {
                    let request = SynthesisRequest::from_voice(text, &self.voice);
                    match self.synthesizer.synthesize(&request).await {
                        Ok(bytes) => {
                            let duration = clip_duration(bytes.clone()).await;
                            self.clip.install(self.transport.as_ref(), index, bytes, duration);
                            queue.extend(self.session.on_clip_ready(index));
                        }
                        Err(e) => {
                            error!("Synthesis failed for dictation phrase {}: {}", index, e);
                            self.session.on_synthesis_failed(index);
                            return Err(e);
                        }
                    }
                }
                Directive::PlayClip { .. } => {
                    self.transport.seek(0.0);
                    self.transport.play();
                }
                Directive::ResumeClip { .. } => self.transport.play(),
                Directive::StartGap { index, .. } => {
                    debug!("Dictation has no repetition gaps, ignoring gap for {}", index);
                }
                Directive::CancelPending => {
                    self.scheduler.cancel_all();
                    self.transport.pause();
                }
                Directive::ReleaseClip => self.clip.release(self.transport.as_ref()),
                Directive::Completed => {
                    self.transport.pause();
                    self.events.notify(SessionUpdate::Completed);
                }
            }
        }
        Ok(())
    }

    /// Pauses the source track once it passes `end`.
    fn stop_at(&self, end: f64) {
        let transport = Arc::clone(&self.transport);
        let watched = Arc::clone(&self.transport);
        let scheduler = Arc::clone(&self.scheduler);
        let epoch = self.scheduler.epoch();

        self.scheduler.spawn(
            WaitCondition::until(
                move || watched.position() >= end || watched.is_ended(),
                self.playback.poll_interval(),
            ),
            move |outcome| {
                if outcome == WaitOutcome::Reached && scheduler.epoch() == epoch {
                    transport.pause();
                }
            },
        );
    }
}
