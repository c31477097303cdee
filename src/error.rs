//! Модуль обработки ошибок библиотеки phrase-practice
//!
//! Этот модуль содержит типы ошибок, которые могут возникнуть при анализе
//! аудио, синтезе речи и работе практических сессий.

use thiserror::Error;

/// Ошибки библиотеки phrase-practice
#[derive(Debug, Error)]
pub enum PracticeError {
    /// Аудио не удалось прочитать или декодировать
    #[error("Audio decode failure: {0}")]
    DecodeFailure(String),

    /// Ошибка бэкенда синтеза речи
    #[error("Speech synthesis failure: {0}")]
    SynthesisFailure(String),

    /// В аудио не найдено ни одной паузы между фразами
    #[error("No usable silence gaps found in the audio track")]
    NoGapsFound,

    /// Пустые входные данные (нет фраз, нулевая длительность)
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// Ошибка конфигурации
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Ошибка HTTP запроса
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Другая ошибка
    #[error("Other error: {0}")]
    Other(String),
}

impl PracticeError {
    /// Ошибки, после которых сессия может продолжить работу с запасным вариантом
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PracticeError::DecodeFailure(_)
                | PracticeError::NoGapsFound
                | PracticeError::SynthesisFailure(_)
        )
    }
}

impl From<&str> for PracticeError {
    fn from(s: &str) -> Self {
        PracticeError::Other(s.to_string())
    }
}

impl From<String> for PracticeError {
    fn from(s: String) -> Self {
        PracticeError::Other(s)
    }
}

/// Тип Result для библиотеки phrase-practice
pub type Result<T> = std::result::Result<T, PracticeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(PracticeError::NoGapsFound.is_recoverable());
        assert!(PracticeError::DecodeFailure("bad header".into()).is_recoverable());
        assert!(PracticeError::SynthesisFailure("503".into()).is_recoverable());
        assert!(!PracticeError::EmptyInput("no phrases".into()).is_recoverable());
        assert!(!PracticeError::Configuration("speed".into()).is_recoverable());
    }

    #[test]
    fn test_string_conversion() {
        let err: PracticeError = "boom".into();
        assert_eq!(err.to_string(), "Other error: boom");
    }
}
