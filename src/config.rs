//! Модуль конфигурации библиотеки phrase-practice
//!
//! Все значения приходят из UI как обычные числа. Отсутствующие поля
//! заменяются значениями по умолчанию, а не приводят к ошибке.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PracticeError, Result};

/// Параметры поиска пауз в аудио
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SilenceConfig {
    /// RMS амплитуда, ниже которой окно считается тишиной
    pub threshold: f32,
    /// Минимальная длительность паузы в секундах
    pub min_silence_duration: f64,
    /// Длительность окна анализа в секундах
    pub window_duration: f64,
    /// Паузы, начинающиеся ближе этого значения к нулю, считаются вступлением
    pub preroll_tolerance: f64,
}

impl Default for SilenceConfig {
    fn default() -> Self {
        Self {
            threshold: 0.01,
            min_silence_duration: 0.3,
            window_duration: 0.01,
            preroll_tolerance: 0.1,
        }
    }
}

/// Параметры режима shadowing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShadowingConfig {
    /// Пауза после фразы = длительность фразы × множитель
    pub gap_multiplier: f64,
    /// Сколько раз проигрывать каждую фразу (0 = бесконечно)
    pub loop_count: u32,
}

impl Default for ShadowingConfig {
    fn default() -> Self {
        Self {
            gap_multiplier: 1.5,
            loop_count: 1,
        }
    }
}

/// Параметры режима диктанта
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DictationConfig {
    /// Сколько раз можно прослушать фразу
    pub max_replays: u32,
}

impl Default for DictationConfig {
    fn default() -> Self {
        Self { max_replays: 3 }
    }
}

/// Параметры воспроизведения
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Скорость воспроизведения
    pub speed: f32,
    /// Как часто проверять позицию воспроизведения, в миллисекундах
    pub position_poll_interval_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            position_poll_interval_ms: 50,
        }
    }
}

impl PlaybackConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.position_poll_interval_ms)
    }
}

/// Голос для синтеза речи
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VoiceConfig {
    pub voice_id: String,
    pub language_code: String,
    pub speaking_rate: f32,
    pub pitch: f32,
    pub use_ssml: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice_id: "en-US-Standard-C".to_string(),
            language_code: "en-US".to_string(),
            speaking_rate: 1.0,
            pitch: 0.0,
            use_ssml: false,
        }
    }
}

/// Параметры оценки ответа в диктанте
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    /// Доля балла за слово с опечаткой
    pub close_credit: f64,
    /// Максимальное расстояние Левенштейна для опечатки
    pub close_max_distance: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            close_credit: 0.5,
            close_max_distance: 2,
        }
    }
}

/// Параметры HTTP клиента синтеза речи
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SynthesisConfig {
    /// URL эндпоинта, возвращающего MP3
    pub endpoint: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    /// Максимальное количество клипов в кэше
    pub cache_capacity: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000/api/synthesize".to_string(),
            timeout_secs: 30,
            max_attempts: 3,
            cache_capacity: 64,
        }
    }
}

/// Конфигурация библиотеки
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PracticeConfig {
    pub silence: SilenceConfig,
    pub shadowing: ShadowingConfig,
    pub dictation: DictationConfig,
    pub playback: PlaybackConfig,
    pub voice: VoiceConfig,
    pub scoring: ScoringConfig,
    pub synthesis: SynthesisConfig,
}

impl PracticeConfig {
    /// Разобрать конфигурацию из JSON строки
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PracticeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Загрузить конфигурацию из JSON файла
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    /// Проверить значения, которые нельзя заменить значениями по умолчанию
    pub fn validate(&self) -> Result<()> {
        if !(self.silence.threshold > 0.0 && self.silence.threshold < 1.0) {
            return Err(PracticeError::Configuration(format!(
                "silence threshold must be in (0, 1), got {}",
                self.silence.threshold
            )));
        }
        if self.silence.window_duration <= 0.0 {
            return Err(PracticeError::Configuration(
                "silence window duration must be positive".to_string(),
            ));
        }
        if self.silence.min_silence_duration < 0.0 {
            return Err(PracticeError::Configuration(
                "minimum silence duration must not be negative".to_string(),
            ));
        }
        if self.shadowing.gap_multiplier <= 0.0 {
            return Err(PracticeError::Configuration(format!(
                "gap multiplier must be positive, got {}",
                self.shadowing.gap_multiplier
            )));
        }
        if self.playback.speed <= 0.0 {
            return Err(PracticeError::Configuration(format!(
                "playback speed must be positive, got {}",
                self.playback.speed
            )));
        }
        if self.playback.position_poll_interval_ms == 0 {
            return Err(PracticeError::Configuration(
                "position poll interval must be at least 1ms".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.scoring.close_credit) {
            return Err(PracticeError::Configuration(format!(
                "close credit must be within [0, 1], got {}",
                self.scoring.close_credit
            )));
        }
        Ok(())
    }
}
