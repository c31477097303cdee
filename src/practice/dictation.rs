//! # Dictation session
//!
//! The learner listens to a phrase (a limited number of times), types it
//! and gets a score from [`TextScorer`].
//!
//! ```text
//! Idle -> AwaitingAnswer(i) -> ShowingResult(i) -> AwaitingAnswer(i + 1) -> ... -> Complete
//! ```

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::{DictationConfig, ScoringConfig};
use crate::error::{PracticeError, Result};
use crate::practice::{check_source, Directive, PhraseSource};
use crate::text::scorer::{ScoreResult, TextScorer};
use crate::timing::{PhraseTiming, TimingPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DictationPhase {
    Idle,
    AwaitingAnswer { index: usize },
    ShowingResult { index: usize },
    Complete,
}

/// Итоги диктанта
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictationSummary {
    pub phrase_count: usize,
    /// Number of recorded scores, skipped phrases included
    pub attempted: usize,
    /// Mean of the recorded scores, 0 when nothing was recorded
    pub average_score: f64,
    pub total_correct: usize,
    /// `total_correct / phrase_count`
    pub accuracy: f64,
}

pub struct DictationSession {
    phrases: Vec<String>,
    source: PhraseSource,
    config: DictationConfig,
    scorer: TextScorer,
    phase: DictationPhase,
    current_index: usize,
    replays_left: u32,
    /// Фраза уже звучала хотя бы раз
    played: bool,
    /// Индекс фразы, для которой есть синтезированный клип
    clip: Option<usize>,
    scores: Vec<u32>,
    total_correct: usize,
    last_result: Option<ScoreResult>,
}

impl DictationSession {
    pub fn new(
        phrases: Vec<String>,
        source: PhraseSource,
        config: DictationConfig,
        scoring: ScoringConfig,
    ) -> Result<Self> {
        check_source(&phrases, &source)?;
        Ok(Self::with_source(phrases, source, config, scoring))
    }

    pub fn from_plan(plan: &TimingPlan, config: DictationConfig, scoring: ScoringConfig) -> Self {
        Self::with_source(plan.phrases.clone(), PhraseSource::from(plan), config, scoring)
    }

    pub fn synthesized(phrases: Vec<String>, config: DictationConfig, scoring: ScoringConfig) -> Self {
        Self::with_source(phrases, PhraseSource::Synthesized, config, scoring)
    }

    fn with_source(
        phrases: Vec<String>,
        source: PhraseSource,
        config: DictationConfig,
        scoring: ScoringConfig,
    ) -> Self {
        let replays_left = config.max_replays;
        Self {
            phrases,
            source,
            config,
            scorer: TextScorer::new(scoring),
            phase: DictationPhase::Idle,
            current_index: 0,
            replays_left,
            played: false,
            clip: None,
            scores: Vec::new(),
            total_correct: 0,
            last_result: None,
        }
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    pub fn phase(&self) -> DictationPhase {
        self.phase
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_phrase(&self) -> Option<&str> {
        self.phrases.get(self.current_index).map(String::as_str)
    }

    /// In `[0, max_replays]`.
    pub fn replays_left(&self) -> u32 {
        self.replays_left
    }

    pub fn can_play(&self) -> bool {
        matches!(self.phase, DictationPhase::AwaitingAnswer { .. }) && self.replays_left > 0
    }

    pub fn scores(&self) -> &[u32] {
        &self.scores
    }

    pub fn total_correct(&self) -> usize {
        self.total_correct
    }

    pub fn last_result(&self) -> Option<&ScoreResult> {
        self.last_result.as_ref()
    }

    pub fn timings(&self) -> Option<&[PhraseTiming]> {
        self.source.timings()
    }

    pub fn uses_source_audio(&self) -> bool {
        self.source.uses_source_audio()
    }

    pub fn is_complete(&self) -> bool {
        self.phase == DictationPhase::Complete
    }

    pub fn start(&mut self) -> Result<Vec<Directive>> {
        if self.phrases.is_empty() {
            return Err(PracticeError::EmptyInput("no phrases to dictate".to_string()));
        }
        info!(
            "Starting dictation over {} phrases, {} replays each",
            self.phrases.len(),
            self.config.max_replays
        );
        Ok(self.reset())
    }

    /// Plays the current phrase, consuming one replay. A no-op once the
    /// budget is spent.
    pub fn play(&mut self) -> Vec<Directive> {
        let DictationPhase::AwaitingAnswer { index } = self.phase else {
            return Vec::new();
        };
        if self.replays_left == 0 {
            debug!("Replay budget spent for phrase {}", index);
            return Vec::new();
        }

        self.replays_left -= 1;
        self.played = true;
        debug!("Playing phrase {}, {} replays left", index, self.replays_left);

        let mut directives = vec![Directive::CancelPending];
        directives.push(self.playback(index));
        directives
    }

    /// Plays the already heard audio again without touching the budget.
    pub fn replay_reference(&mut self) -> Vec<Directive> {
        let index = match self.phase {
            DictationPhase::AwaitingAnswer { index } | DictationPhase::ShowingResult { index } => index,
            _ => return Vec::new(),
        };
        if !self.played {
            return Vec::new();
        }

        if let Some(timing) = self.source.timing(index) {
            return vec![
                Directive::CancelPending,
                Directive::PlaySegment {
                    index,
                    start: timing.start,
                    end: timing.end,
                },
            ];
        }
        if self.clip == Some(index) {
            return vec![Directive::CancelPending, Directive::PlayClip { index }];
        }
        Vec::new()
    }

    pub fn on_clip_ready(&mut self, index: usize) -> Vec<Directive> {
        if self.source.uses_source_audio() || index != self.current_index {
            return Vec::new();
        }
        self.clip = Some(index);
        match self.phase {
            DictationPhase::AwaitingAnswer { .. } => vec![Directive::PlayClip { index }],
            _ => Vec::new(),
        }
    }

    /// Synthesis failed: the replay is given back so the learner can retry.
    pub fn on_synthesis_failed(&mut self, index: usize) {
        if index == self.current_index && self.replays_left < self.config.max_replays {
            self.replays_left += 1;
            self.played = self.replays_left < self.config.max_replays;
        }
    }

    /// Scores `answer` against the current phrase. `None` when no answer is expected.
    pub fn submit(&mut self, answer: &str) -> Option<ScoreResult> {
        let DictationPhase::AwaitingAnswer { index } = self.phase else {
            return None;
        };

        let result = self.scorer.score(answer, &self.phrases[index]);
        info!("Phrase {} scored {}", index, result.score);
        self.record(index, result.clone());
        Some(result)
    }

    /// Records a zero for the current phrase and moves on.
    pub fn skip(&mut self) -> Vec<Directive> {
        if let DictationPhase::AwaitingAnswer { index } = self.phase {
            debug!("Skipping phrase {}", index);
            let result = ScoreResult::skipped(&self.phrases[index]);
            self.record(index, result);
        }
        self.next()
    }

    pub fn next(&mut self) -> Vec<Directive> {
        let DictationPhase::ShowingResult { index } = self.phase else {
            return Vec::new();
        };

        let mut directives = vec![Directive::CancelPending];
        if self.clip.take().is_some() {
            directives.push(Directive::ReleaseClip);
        }
        self.last_result = None;
        self.played = false;

        let next = index + 1;
        if next >= self.phrases.len() {
            info!("Dictation complete: {:?}", self.summary());
            self.phase = DictationPhase::Complete;
            self.current_index = self.phrases.len();
            directives.push(Directive::Completed);
            return directives;
        }

        self.current_index = next;
        self.replays_left = self.config.max_replays;
        self.phase = DictationPhase::AwaitingAnswer { index: next };
        directives
    }

    /// Clears every score and starts over from the first phrase.
    pub fn restart(&mut self) -> Vec<Directive> {
        if self.phrases.is_empty() {
            return Vec::new();
        }
        info!("Restarting dictation");
        self.reset()
    }

    pub fn stop(&mut self) -> Vec<Directive> {
        info!("Stopping dictation session");
        self.phase = DictationPhase::Idle;
        self.clip = None;
        self.played = false;
        vec![Directive::CancelPending, Directive::ReleaseClip]
    }

    pub fn summary(&self) -> DictationSummary {
        let average_score = if self.scores.is_empty() {
            0.0
        } else {
            self.scores.iter().map(|&s| s as f64).sum::<f64>() / self.scores.len() as f64
        };
        let accuracy = if self.phrases.is_empty() {
            0.0
        } else {
            self.total_correct as f64 / self.phrases.len() as f64
        };

        DictationSummary {
            phrase_count: self.phrases.len(),
            attempted: self.scores.len(),
            average_score,
            total_correct: self.total_correct,
            accuracy,
        }
    }

    fn reset(&mut self) -> Vec<Directive> {
        let mut directives = vec![Directive::CancelPending];
        if self.clip.take().is_some() {
            directives.push(Directive::ReleaseClip);
        }
        self.phase = DictationPhase::AwaitingAnswer { index: 0 };
        self.current_index = 0;
        self.replays_left = self.config.max_replays;
        self.played = false;
        self.scores.clear();
        self.total_correct = 0;
        self.last_result = None;
        directives
    }

    fn record(&mut self, index: usize, result: ScoreResult) {
        self.scores.push(result.score);
        if result.score == 100 {
            self.total_correct += 1;
        }
        self.last_result = Some(result);
        self.phase = DictationPhase::ShowingResult { index };
    }

    fn playback(&self, index: usize) -> Directive {
        if let Some(timing) = self.source.timing(index) {
            return Directive::PlaySegment {
                index,
                start: timing.start,
                end: timing.end,
            };
        }
        if self.clip == Some(index) {
            return Directive::PlayClip { index };
        }
        Directive::Synthesize {
            index,
            text: self.phrases[index].clone(),
        }
    }
}
