//! Основной файл библиотеки phrase-practice
//!
//! Библиотека содержит клиентское ядро тренажёра произношения и аудирования:
//! разбиение текста на фразы, поиск пауз в аудио, привязку фраз ко времени,
//! оценку ответов и две практические сессии (shadowing и диктант).

pub mod config;
pub mod error;
pub mod media;
pub mod practice;
pub mod text;
pub mod timing;
pub mod tts;
pub mod utils;

use log::{info, warn};
use serde::Serialize;

pub use crate::config::PracticeConfig;
pub use crate::error::{PracticeError, Result};
pub use crate::media::{AudioSource, DecodedAudio, PlaybackTransport, SilenceDetector, SilenceInterval, SilenceScan};
pub use crate::practice::{
    Directive, DictationRunner, DictationSession, PhraseSource, SessionUpdate, ShadowingHandle, ShadowingRunner,
    ShadowingSession,
};
pub use crate::text::{split_phrases, ScoreResult, TextScorer};
pub use crate::timing::{plan_timings, PhraseTiming, TimingAccuracy, TimingPlan};
pub use crate::tts::{CachedSynthesizer, HttpSpeechClient, SpeechSynthesizer, SynthesisRequest};

/// Phrases of a practice text and, when a source track exists, their timings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeMaterial {
    /// Фразы в порядке текста
    pub phrases: Vec<String>,
    /// `None` when phrases have to be synthesized
    pub plan: Option<TimingPlan>,
    /// Паузы, найденные в исходном аудио
    pub silences: Vec<SilenceInterval>,
}

impl PracticeMaterial {
    /// Phrases the sessions will use. A whole-track plan merges them into one.
    pub fn session_phrases(&self) -> &[String] {
        match &self.plan {
            Some(plan) => &plan.phrases,
            None => &self.phrases,
        }
    }

    pub fn source(&self) -> PhraseSource {
        match &self.plan {
            Some(plan) => PhraseSource::from(plan),
            None => PhraseSource::Synthesized,
        }
    }

    pub fn shadowing(&self, config: &PracticeConfig) -> ShadowingSession {
        match &self.plan {
            Some(plan) => ShadowingSession::from_plan(plan, config.shadowing.clone()),
            None => ShadowingSession::synthesized(self.phrases.clone(), config.shadowing.clone()),
        }
    }

    pub fn dictation(&self, config: &PracticeConfig) -> DictationSession {
        match &self.plan {
            Some(plan) => DictationSession::from_plan(plan, config.dictation.clone(), config.scoring.clone()),
            None => DictationSession::synthesized(
                self.phrases.clone(),
                config.dictation.clone(),
                config.scoring.clone(),
            ),
        }
    }
}

/// Segments `text` and times the phrases inside `audio`.
///
/// `duration_hint` is the track length reported by the player, used when the
/// audio cannot be analysed. If the track can be neither analysed nor
/// measured, the material falls back to synthesized phrases.
pub async fn prepare_material(
    text: &str,
    audio: Option<&AudioSource>,
    duration_hint: Option<f64>,
    config: &PracticeConfig,
    client: &reqwest::Client,
) -> Result<PracticeMaterial> {
    info!("Preparing practice material");

    // 1. Разбиение текста на фразы
    let phrases = split_phrases(text);
    if phrases.is_empty() {
        return Err(PracticeError::EmptyInput("text contains no phrases".to_string()));
    }
    info!("Text split into {} phrases", phrases.len());

    let Some(source) = audio else {
        info!("No source audio, phrases will be synthesized on demand");
        return Ok(PracticeMaterial {
            phrases,
            plan: None,
            silences: Vec::new(),
        });
    };

    // 2. Поиск пауз в аудио
    let detector = SilenceDetector::new(config.silence.clone());
    let scan = detector.scan_source(source, client).await;
    let silences = scan
        .as_ref()
        .map(|scan| scan.intervals.clone())
        .unwrap_or_default();

    // 3. Привязка фраз ко времени
    match plan_timings(phrases.clone(), scan, duration_hint, &config.silence) {
        Ok(plan) => {
            info!("Timed {} phrases ({:?})", plan.len(), plan.accuracy);
            Ok(PracticeMaterial {
                phrases,
                plan: Some(plan),
                silences,
            })
        }
        Err(PracticeError::EmptyInput(reason)) => {
            warn!("Source audio is unusable ({}), falling back to synthesis", reason);
            Ok(PracticeMaterial {
                phrases,
                plan: None,
                silences,
            })
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::io::Cursor;

    const RATE: u32 = 8000;

    /// Тон, тишина, тон
    fn two_phrase_wav() -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for (seconds, amplitude) in [(1.0, 0.5f32), (0.5, 0.0), (1.0, 0.5)] {
                let count = (seconds * RATE as f64) as usize;
                for i in 0..count {
                    let sample = (i as f32 * 0.3).sin() * amplitude;
                    writer.write_sample((sample * i16::MAX as f32) as i16).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[tokio::test]
    async fn test_material_aligned_to_silence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.wav");
        std::fs::write(&path, two_phrase_wav()).unwrap();

        let config = PracticeConfig::default();
        let material = prepare_material(
            "Hello there. How are you?",
            Some(&AudioSource::Path(path)),
            None,
            &config,
            &reqwest::Client::new(),
        )
        .await
        .unwrap();

        let plan = material.plan.as_ref().unwrap();
        assert_eq!(plan.accuracy, TimingAccuracy::SilenceAligned);
        assert_eq!(plan.timings.len(), 2);
        assert!((plan.timings[0].end - 1.0).abs() < 0.05);
        assert!((plan.timings[1].start - 1.5).abs() < 0.05);
        assert_eq!(material.silences.len(), 1);
        assert!(material.shadowing(&config).uses_source_audio());
    }

    #[tokio::test]
    async fn test_material_without_audio_is_synthesized() {
        let config = PracticeConfig::default();
        let material = prepare_material("One. Two.", None, None, &config, &reqwest::Client::new())
            .await
            .unwrap();

        assert!(material.plan.is_none());
        assert_eq!(material.source(), PhraseSource::Synthesized);
        assert_eq!(material.session_phrases().len(), 2);
        assert!(!material.dictation(&config).uses_source_audio());
    }

    #[tokio::test]
    async fn test_undecodable_audio_uses_duration_hint() {
        let config = PracticeConfig::default();
        let garbage = AudioSource::Bytes(Bytes::from_static(b"definitely not audio"));

        let material = prepare_material("One. Three.", Some(&garbage), Some(6.0), &config, &reqwest::Client::new())
            .await
            .unwrap();
        let plan = material.plan.unwrap();
        assert_eq!(plan.accuracy, TimingAccuracy::Estimated);
        assert_eq!(plan.timings[1].end, 6.0);

        let material = prepare_material("One. Three.", Some(&garbage), None, &config, &reqwest::Client::new())
            .await
            .unwrap();
        assert!(material.plan.is_none());
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected() {
        let err = prepare_material("  ", None, None, &PracticeConfig::default(), &reqwest::Client::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PracticeError::EmptyInput(_)));
    }
}
