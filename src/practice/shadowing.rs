//! # Shadowing session
//!
//! Plays each phrase, leaves a gap of `duration × gap_multiplier` for the
//! learner to repeat it, loops the phrase `loop_count` times and moves on.
//!
//! ```text
//! Idle -> Playing(i) -> Gap(i) -> Playing(i) ... -> Playing(i + 1) -> ... -> Complete
//!            \______ Paused ______/
//! ```
//!
//! The session never touches audio itself; every transition returns the
//! [`Directive`]s a runner has to execute.

use log::{debug, info, warn};
use serde::Serialize;

use crate::config::ShadowingConfig;
use crate::error::{PracticeError, Result};
use crate::practice::{check_source, Directive, PhraseSource};
use crate::timing::{PhraseTiming, TimingAccuracy, TimingPlan};

/// What `resume` continues with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumePoint {
    /// Продолжить фразу с места остановки
    Position,
    /// Начать паузу заново
    Gap,
    /// Начать фразу сначала (после перехода во время паузы)
    Beginning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ShadowingPhase {
    Idle,
    Playing { index: usize },
    Gap { index: usize },
    Paused { index: usize, resume: ResumePoint },
    Complete,
}

/// Synthesized clip currently owned by the session.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ClipInfo {
    index: usize,
    duration: f64,
}

pub struct ShadowingSession {
    phrases: Vec<String>,
    source: PhraseSource,
    config: ShadowingConfig,
    phase: ShadowingPhase,
    current_index: usize,
    loop_iteration: u32,
    clip: Option<ClipInfo>,
}

impl ShadowingSession {
    /// Fails when the timings do not match the phrases one to one.
    pub fn new(phrases: Vec<String>, source: PhraseSource, config: ShadowingConfig) -> Result<Self> {
        check_source(&phrases, &source)?;
        Ok(Self::with_source(phrases, source, config))
    }

    /// Session over a timed source track.
    pub fn from_plan(plan: &TimingPlan, config: ShadowingConfig) -> Self {
        Self::with_source(plan.phrases.clone(), PhraseSource::from(plan), config)
    }

    /// Session that synthesizes every phrase on demand.
    pub fn synthesized(phrases: Vec<String>, config: ShadowingConfig) -> Self {
        Self::with_source(phrases, PhraseSource::Synthesized, config)
    }

    fn with_source(phrases: Vec<String>, source: PhraseSource, config: ShadowingConfig) -> Self {
        Self {
            phrases,
            source,
            config,
            phase: ShadowingPhase::Idle,
            current_index: 0,
            loop_iteration: 0,
            clip: None,
        }
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    pub fn phase(&self) -> ShadowingPhase {
        self.phase
    }

    /// In `[0, phrases.len()]`; `phrases.len()` once complete.
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_phrase(&self) -> Option<&str> {
        self.phrases.get(self.current_index).map(String::as_str)
    }

    /// True while a phrase or its gap is running.
    pub fn is_playing(&self) -> bool {
        matches!(
            self.phase,
            ShadowingPhase::Playing { .. } | ShadowingPhase::Gap { .. }
        )
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.phase, ShadowingPhase::Paused { .. })
    }

    pub fn is_complete(&self) -> bool {
        self.phase == ShadowingPhase::Complete
    }

    pub fn loop_iteration(&self) -> u32 {
        self.loop_iteration
    }

    pub fn timings(&self) -> Option<&[PhraseTiming]> {
        self.source.timings()
    }

    pub fn uses_source_audio(&self) -> bool {
        self.source.uses_source_audio()
    }

    pub fn accuracy(&self) -> Option<TimingAccuracy> {
        self.source.accuracy()
    }

    pub fn config(&self) -> &ShadowingConfig {
        &self.config
    }

    /// Starts from the phrase chosen with `jump_to` while idle, or from 0.
    pub fn start(&mut self) -> Result<Vec<Directive>> {
        if self.phrases.is_empty() {
            return Err(PracticeError::EmptyInput("no phrases to practice".to_string()));
        }

        let index = if self.current_index < self.phrases.len() && self.phase == ShadowingPhase::Idle {
            self.current_index
        } else {
            0
        };
        info!(
            "Starting shadowing at phrase {} of {} (loop count {})",
            index + 1,
            self.phrases.len(),
            self.config.loop_count
        );

        let mut directives = vec![Directive::CancelPending];
        self.release_clip_unless(index, &mut directives);
        self.loop_iteration = 0;
        self.current_index = index;
        directives.extend(self.begin_phrase(index));
        Ok(directives)
    }

    /// The phrase window (or the clip) reached its end.
    pub fn on_phrase_ended(&mut self, index: usize) -> Vec<Directive> {
        if self.phase != (ShadowingPhase::Playing { index }) {
            debug!("Ignoring phrase end for {} in {:?}", index, self.phase);
            return Vec::new();
        }

        let duration = self.gap_duration(index);
        debug!("Phrase {} ended, gap of {:.2}s", index, duration);
        self.phase = ShadowingPhase::Gap { index };
        vec![Directive::StartGap { index, duration }]
    }

    /// The repetition gap after phrase `index` ran out.
    pub fn on_gap_elapsed(&mut self, index: usize) -> Vec<Directive> {
        if self.phase != (ShadowingPhase::Gap { index }) {
            debug!("Ignoring gap expiry for {} in {:?}", index, self.phase);
            return Vec::new();
        }

        self.loop_iteration += 1;
        let loop_count = self.config.loop_count;
        if loop_count == 0 || self.loop_iteration < loop_count {
            debug!("Repeating phrase {} (iteration {})", index, self.loop_iteration);
            return self.begin_phrase(index);
        }

        self.loop_iteration = 0;
        self.advance_from(index)
    }

    /// Synthesized audio for phrase `index` is loaded and `duration` seconds long.
    pub fn on_clip_ready(&mut self, index: usize, duration: f64) -> Vec<Directive> {
        if self.source.uses_source_audio() || index != self.current_index {
            return Vec::new();
        }

        match self.phase {
            ShadowingPhase::Playing { index: playing } if playing == index => {
                self.clip = Some(ClipInfo { index, duration });
                vec![Directive::PlayClip { index }]
            }
            ShadowingPhase::Paused { index: paused, .. } if paused == index => {
                self.clip = Some(ClipInfo { index, duration });
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    /// Synthesis for phrase `index` failed: the phrase is skipped.
    pub fn on_synthesis_failed(&mut self, index: usize) -> Vec<Directive> {
        if self.phase != (ShadowingPhase::Playing { index }) {
            return Vec::new();
        }

        warn!("Skipping phrase {} after synthesis failure", index);
        self.loop_iteration = 0;
        self.advance_from(index)
    }

    /// Moves to phrase `index` (clamped to the last phrase).
    pub fn jump_to(&mut self, index: usize) -> Vec<Directive> {
        if self.phrases.is_empty() {
            return Vec::new();
        }
        let index = index.min(self.phrases.len() - 1);

        let mut directives = vec![Directive::CancelPending];
        self.release_clip_unless(index, &mut directives);
        self.loop_iteration = 0;
        self.current_index = index;

        match self.phase {
            ShadowingPhase::Playing { .. } | ShadowingPhase::Gap { .. } => {
                debug!("Jumping to phrase {}", index);
                directives.extend(self.begin_phrase(index));
            }
            ShadowingPhase::Paused { .. } => {
                self.phase = ShadowingPhase::Paused {
                    index,
                    resume: ResumePoint::Beginning,
                };
            }
            ShadowingPhase::Idle | ShadowingPhase::Complete => {
                self.phase = ShadowingPhase::Idle;
            }
        }
        directives
    }

    pub fn next(&mut self) -> Vec<Directive> {
        self.jump_to(self.active_index().saturating_add(1))
    }

    pub fn previous(&mut self) -> Vec<Directive> {
        self.jump_to(self.active_index().saturating_sub(1))
    }

    /// Freezes playback or the gap; `resume` picks up from the same place.
    pub fn pause(&mut self) -> Vec<Directive> {
        let (index, resume) = match self.phase {
            ShadowingPhase::Playing { index } => (index, ResumePoint::Position),
            ShadowingPhase::Gap { index } => (index, ResumePoint::Gap),
            _ => return Vec::new(),
        };
        debug!("Pausing at phrase {}", index);
        self.phase = ShadowingPhase::Paused { index, resume };
        vec![Directive::CancelPending]
    }

    pub fn resume(&mut self) -> Vec<Directive> {
        let ShadowingPhase::Paused { index, resume } = self.phase else {
            return Vec::new();
        };
        debug!("Resuming phrase {} ({:?})", index, resume);

        match resume {
            ResumePoint::Beginning => self.begin_phrase(index),
            ResumePoint::Gap => {
                self.phase = ShadowingPhase::Gap { index };
                vec![Directive::StartGap {
                    index,
                    duration: self.gap_duration(index),
                }]
            }
            ResumePoint::Position => {
                self.phase = ShadowingPhase::Playing { index };
                if let Some(timing) = self.source.timing(index) {
                    vec![Directive::ResumeSegment { index, end: timing.end }]
                } else if self.clip.map(|c| c.index) == Some(index) {
                    vec![Directive::ResumeClip { index }]
                } else {
                    // Синтез был отменён паузой, запрашиваем снова
                    vec![Directive::Synthesize {
                        index,
                        text: self.phrases[index].clone(),
                    }]
                }
            }
        }
    }

    /// Tears everything down and returns to `Idle`.
    pub fn stop(&mut self) -> Vec<Directive> {
        info!("Stopping shadowing session");
        self.phase = ShadowingPhase::Idle;
        self.current_index = 0;
        self.loop_iteration = 0;
        self.clip = None;
        vec![Directive::CancelPending, Directive::ReleaseClip]
    }

    fn active_index(&self) -> usize {
        self.current_index.min(self.phrases.len().saturating_sub(1))
    }

    fn begin_phrase(&mut self, index: usize) -> Vec<Directive> {
        self.phase = ShadowingPhase::Playing { index };
        self.current_index = index;

        if let Some(timing) = self.source.timing(index) {
            return vec![Directive::PlaySegment {
                index,
                start: timing.start,
                end: timing.end,
            }];
        }
        if self.clip.map(|c| c.index) == Some(index) {
            return vec![Directive::PlayClip { index }];
        }
        vec![Directive::Synthesize {
            index,
            text: self.phrases[index].clone(),
        }]
    }

    fn advance_from(&mut self, index: usize) -> Vec<Directive> {
        let next = index + 1;
        let mut directives = Vec::new();
        self.release_clip_unless(next, &mut directives);

        if next >= self.phrases.len() {
            info!("Shadowing session complete");
            self.phase = ShadowingPhase::Complete;
            self.current_index = self.phrases.len();
            directives.push(Directive::Completed);
            return directives;
        }

        directives.extend(self.begin_phrase(next));
        directives
    }

    fn release_clip_unless(&mut self, keep_index: usize, directives: &mut Vec<Directive>) {
        if let Some(clip) = self.clip {
            if clip.index != keep_index {
                self.clip = None;
                directives.push(Directive::ReleaseClip);
            }
        }
    }

    /// Длительность паузы не зависит от скорости воспроизведения
    fn gap_duration(&self, index: usize) -> f64 {
        let phrase_duration = match self.source.timing(index) {
            Some(timing) => timing.duration,
            None => self.clip.filter(|c| c.index == index).map_or(0.0, |c| c.duration),
        };
        phrase_duration.max(0.0) * self.config.gap_multiplier
    }
}
