//! # Silence detection
//!
//! Finds pauses between phrases in speech audio from its short-window
//! energy envelope.
//!
//! ## Algorithm
//!
//! * The buffer is cut into fixed windows (10 ms by default)
//! * A window whose RMS is below the threshold is silent
//! * Consecutive silent windows form a run; a loud window closes it
//! * Runs shorter than the minimum duration are noise, not boundaries
//!
//! A run still open at the end of the buffer is closed at the total duration.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::SilenceConfig;
use crate::error::{PracticeError, Result};
use crate::media::decoder::{self, compute_rms, AudioSource, DecodedAudio};

/// A pause in the audio, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SilenceInterval {
    pub start: f64,
    pub end: f64,
    pub midpoint: f64,
}

impl SilenceInterval {
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start,
            end,
            midpoint: (start + end) / 2.0,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Ordered pauses of one audio source plus its total duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SilenceScan {
    pub intervals: Vec<SilenceInterval>,
    pub total_duration: f64,
}

/// RMS based silence detector tuned for pauses in speech.
#[derive(Debug, Clone, Default)]
pub struct SilenceDetector {
    config: SilenceConfig,
}

impl SilenceDetector {
    pub fn new(config: SilenceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SilenceConfig {
        &self.config
    }

    pub fn scan(&self, audio: &DecodedAudio) -> Result<SilenceScan> {
        self.scan_samples(&audio.samples, audio.sample_rate)
    }

    /// Scans a mono buffer. A zero sample rate means the audio was never
    /// decoded properly and is reported as a failure, not as "no silence".
    pub fn scan_samples(&self, samples: &[f32], sample_rate: u32) -> Result<SilenceScan> {
        if sample_rate == 0 {
            return Err(PracticeError::DecodeFailure(
                "sample rate of 0 Hz".to_string(),
            ));
        }

        let total_duration = decoder::duration_in_seconds(samples.len(), sample_rate);
        let window_size = ((sample_rate as f64 * self.config.window_duration).floor() as usize).max(1);
        let window_duration = window_size as f64 / sample_rate as f64;
        let min_duration = self.config.min_silence_duration;

        let mut intervals = Vec::new();
        let mut silence_start: Option<f64> = None;

        for (index, window) in samples.chunks(window_size).enumerate() {
            let time = index as f64 * window_duration;
            let is_silent = compute_rms(window) < self.config.threshold;

            match (is_silent, silence_start) {
                (true, None) => silence_start = Some(time),
                (false, Some(start)) => {
                    if time - start >= min_duration {
                        intervals.push(SilenceInterval::new(start, time));
                    }
                    silence_start = None;
                }
                _ => {}
            }
        }

        // Тишина до конца буфера
        if let Some(start) = silence_start {
            if total_duration - start >= min_duration && total_duration > start {
                intervals.push(SilenceInterval::new(start, total_duration));
            }
        }

        debug!(
            "Silence scan: {} windows of {:.3}s, {} intervals",
            samples.len().div_ceil(window_size),
            window_duration,
            intervals.len()
        );

        Ok(SilenceScan {
            intervals,
            total_duration,
        })
    }

    /// Decodes the source and scans it.
    pub async fn scan_source(&self, source: &AudioSource, client: &reqwest::Client) -> Result<SilenceScan> {
        let audio = decoder::decode_source(source, client).await?;
        let scan = self.scan(&audio)?;
        info!(
            "Found {} silence intervals in {:.2}s of audio",
            scan.intervals.len(),
            scan.total_duration
        );
        Ok(scan)
    }
}
