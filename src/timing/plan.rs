//! Choosing how phrases are timed inside a source track.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::SilenceConfig;
use crate::error::{PracticeError, Result};
use crate::media::silence::SilenceScan;
use crate::timing::reconciler::{estimate_timings, reconcile, PhraseTiming};

/// How trustworthy the phrase boundaries are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingAccuracy {
    /// Boundaries come from detected pauses
    SilenceAligned,
    /// Boundaries are a character-count approximation
    Estimated,
    /// Phrases could not be timed; the whole track is one phrase
    WholeTrack,
}

/// Phrases of a source track together with their timings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingPlan {
    pub phrases: Vec<String>,
    pub timings: Vec<PhraseTiming>,
    pub accuracy: TimingAccuracy,
    pub total_duration: f64,
}

impl TimingPlan {
    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }
}

/// Builds a timing plan from a scan result, falling back step by step:
/// silence gaps, then the proportional estimator, then whole-track playback.
///
/// `duration_hint` is the track duration as reported by the player; it is
/// only used when the scan itself failed.
pub fn plan_timings(
    phrases: Vec<String>,
    scan: Result<SilenceScan>,
    duration_hint: Option<f64>,
    config: &SilenceConfig,
) -> Result<TimingPlan> {
    if phrases.is_empty() {
        return Err(PracticeError::EmptyInput("no phrases to time".to_string()));
    }

    let total_duration = match scan {
        Ok(scan) => {
            match reconcile(&scan, phrases.len(), config.preroll_tolerance) {
                Ok(timings) => {
                    info!("Aligned {} phrases to silence gaps", timings.len());
                    return Ok(TimingPlan {
                        phrases,
                        timings,
                        accuracy: TimingAccuracy::SilenceAligned,
                        total_duration: scan.total_duration,
                    });
                }
                Err(PracticeError::NoGapsFound) => {
                    info!("No usable silence gaps, estimating phrase timings");
                }
                Err(e) => return Err(e),
            }
            Some(scan.total_duration)
        }
        Err(e) => {
            warn!("Audio analysis failed ({}), estimating phrase timings", e);
            duration_hint
        }
    };

    let total_duration = total_duration
        .filter(|d| *d > 0.0)
        .ok_or_else(|| PracticeError::EmptyInput("audio duration is unknown or zero".to_string()))?;

    let timings = estimate_timings(phrases.as_slice(), total_duration);
    if !timings.is_empty() {
        return Ok(TimingPlan {
            phrases,
            timings,
            accuracy: TimingAccuracy::Estimated,
            total_duration,
        });
    }

    warn!("Cannot time phrases, playing the whole track as one phrase");
    Ok(TimingPlan {
        phrases: vec![phrases.join(" ")],
        timings: vec![PhraseTiming::new(0.0, total_duration)],
        accuracy: TimingAccuracy::WholeTrack,
        total_duration,
    })
}
