//! Модуль синтеза речи для фраз без исходного аудио

pub mod cache;
pub mod http;
pub mod synthesizer;

pub use cache::CachedSynthesizer;
pub use http::HttpSpeechClient;
pub use synthesizer::{SpeechSynthesizer, SynthesisRequest};
