//! Модуль для работы с аудио
//!
//! Декодирование, поиск пауз и интерфейс воспроизведения.

pub mod decoder;
pub mod silence;
pub mod transport;

pub use decoder::{decode_audio_bytes, decode_audio_file, decode_source, AudioSource, DecodedAudio};
pub use silence::{SilenceDetector, SilenceInterval, SilenceScan};
pub use transport::{AudioClip, PlaybackTransport};
