//! Модуль для работы с текстом
//!
//! Разбиение текста на фразы и оценка ответов в диктанте.

pub mod scorer;
pub mod segmenter;

pub use scorer::{normalize, DiffKind, DiffToken, ScoreResult, TextScorer};
pub use segmenter::split_phrases;
