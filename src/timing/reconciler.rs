//! # Phrase timing
//!
//! Maps detected pauses onto the phrase list to find where each phrase
//! starts and ends inside the full track.
//!
//! ## Key features:
//!
//! * Leading silence is treated as pre-roll, not as a phrase boundary
//! * Phrase `i` ends where gap `i` starts; phrase `i + 1` starts where it ends
//! * The last phrase, and every phrase past the available gaps, runs to the end
//! * A proportional estimator by character count when no gaps are usable

use serde::{Deserialize, Serialize};

use crate::error::{PracticeError, Result};
use crate::media::silence::SilenceScan;
use crate::text::segmenter::char_count;

/// Window of one phrase inside the full track, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhraseTiming {
    pub start: f64,
    pub end: f64,
    pub duration: f64,
}

impl PhraseTiming {
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start,
            end,
            duration: end - start,
        }
    }
}

/// Builds per-phrase timings from a silence scan.
///
/// Intervals starting within `preroll_tolerance` of zero are dropped and
/// move the first phrase's start to their end. Fails with
/// [`PracticeError::NoGapsFound`] when no usable gap remains; the caller is
/// expected to switch to [`estimate_timings`].
pub fn reconcile(scan: &SilenceScan, phrase_count: usize, preroll_tolerance: f64) -> Result<Vec<PhraseTiming>> {
    if phrase_count == 0 {
        return Ok(Vec::new());
    }

    let mut audio_start = 0.0;
    let mut saw_preroll = false;
    let mut gaps = Vec::with_capacity(scan.intervals.len());

    for interval in &scan.intervals {
        if interval.start <= preroll_tolerance {
            if !saw_preroll {
                audio_start = interval.end;
                saw_preroll = true;
            }
            continue;
        }
        gaps.push(interval);
    }

    if gaps.is_empty() {
        return Err(PracticeError::NoGapsFound);
    }

    let mut timings = Vec::with_capacity(phrase_count);
    let mut current_start = audio_start;

    for i in 0..phrase_count {
        let is_last = i + 1 == phrase_count;
        match gaps.get(i) {
            Some(gap) if !is_last => {
                timings.push(PhraseTiming::new(current_start, gap.start));
                current_start = gap.end;
            }
            // Фразы без своей паузы тянутся до конца трека
            _ => timings.push(PhraseTiming::new(current_start, scan.total_duration)),
        }
    }

    Ok(timings)
}

/// Allocates the track to phrases proportionally to their character counts.
///
/// Phrases are laid out back to back from 0. Returns an empty list when
/// there are no phrases, no characters or no duration to share.
pub fn estimate_timings<S: AsRef<str>>(phrases: &[S], total_duration: f64) -> Vec<PhraseTiming> {
    let counts: Vec<usize> = phrases.iter().map(|p| char_count(p.as_ref())).collect();
    let total_chars: usize = counts.iter().sum();

    if counts.is_empty() || total_chars == 0 || total_duration <= 0.0 {
        return Vec::new();
    }

    let mut timings = Vec::with_capacity(counts.len());
    let mut cursor = 0.0;

    for (i, &chars) in counts.iter().enumerate() {
        let end = if i + 1 == counts.len() {
            total_duration
        } else {
            cursor + total_duration * chars as f64 / total_chars as f64
        };
        timings.push(PhraseTiming::new(cursor, end));
        cursor = end;
    }

    timings
}
