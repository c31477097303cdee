//! Модуль практических сессий: shadowing и диктант
//!
//! Сессии - синхронные конечные автоматы. Каждый переход возвращает список
//! [`Directive`], которые исполняет раннер: воспроизведение, синтез, таймеры.

pub mod dictation;
pub mod events;
pub mod runner;
pub mod scheduler;
pub mod shadowing;

use serde::{Deserialize, Serialize};

use crate::timing::{PhraseTiming, TimingAccuracy, TimingPlan};

pub use dictation::{DictationPhase, DictationSession, DictationSummary};
pub use events::{SessionEvents, SessionUpdate};
pub use runner::{DictationRunner, ShadowingHandle, ShadowingRunner};
pub use scheduler::{Scheduler, WaitCondition, WaitOutcome};
pub use shadowing::{ResumePoint, ShadowingPhase, ShadowingSession};

/// Side effect requested by a session transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Seek the source track to `start`, play and stop at `end`
    PlaySegment { index: usize, start: f64, end: f64 },
    /// Continue the source track from where it was paused until `end`
    ResumeSegment { index: usize, end: f64 },
    /// Request audio for the phrase from the speech backend
    Synthesize { index: usize, text: String },
    /// Play the session's clip from the beginning
    PlayClip { index: usize },
    /// Continue the paused clip
    ResumeClip { index: usize },
    /// Wait `duration` seconds for the learner to repeat the phrase
    StartGap { index: usize, duration: f64 },
    /// Stop playback and drop every pending timer and watcher
    CancelPending,
    /// Free the synthesized clip, if any
    ReleaseClip,
    Completed,
}

/// Where phrase audio comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhraseSource {
    /// Phrases are windows of one loaded source track
    Track {
        timings: Vec<PhraseTiming>,
        accuracy: TimingAccuracy,
    },
    /// Каждая фраза синтезируется по запросу
    Synthesized,
}

impl PhraseSource {
    pub fn uses_source_audio(&self) -> bool {
        matches!(self, PhraseSource::Track { .. })
    }

    pub fn timing(&self, index: usize) -> Option<PhraseTiming> {
        match self {
            PhraseSource::Track { timings, .. } => timings.get(index).copied(),
            PhraseSource::Synthesized => None,
        }
    }

    pub fn timings(&self) -> Option<&[PhraseTiming]> {
        match self {
            PhraseSource::Track { timings, .. } => Some(timings),
            PhraseSource::Synthesized => None,
        }
    }

    pub fn accuracy(&self) -> Option<TimingAccuracy> {
        match self {
            PhraseSource::Track { accuracy, .. } => Some(*accuracy),
            PhraseSource::Synthesized => None,
        }
    }
}

impl From<&TimingPlan> for PhraseSource {
    fn from(plan: &TimingPlan) -> Self {
        PhraseSource::Track {
            timings: plan.timings.clone(),
            accuracy: plan.accuracy,
        }
    }
}

/// Checks that timings, when present, cover exactly the given phrases.
pub(crate) fn check_source(phrases: &[String], source: &PhraseSource) -> crate::error::Result<()> {
    if let Some(timings) = source.timings() {
        if timings.len() != phrases.len() {
            return Err(crate::error::PracticeError::Configuration(format!(
                "{} phrase timings for {} phrases",
                timings.len(),
                phrases.len()
            )));
        }
    }
    Ok(())
}
