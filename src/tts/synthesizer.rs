//! Контракт с бэкендом синтеза речи

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::config::VoiceConfig;
use crate::error::Result;

/// Parameters of one synthesis call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisRequest {
    pub text: String,
    pub voice_id: String,
    pub language_code: String,
    pub speaking_rate: f32,
    pub pitch: f32,
    pub use_ssml: bool,
}

impl SynthesisRequest {
    pub fn from_voice(text: impl Into<String>, voice: &VoiceConfig) -> Self {
        Self {
            text: text.into(),
            voice_id: voice.voice_id.clone(),
            language_code: voice.language_code.clone(),
            speaking_rate: voice.speaking_rate,
            pitch: voice.pitch,
            use_ssml: voice.use_ssml,
        }
    }
}

/// Text-to-speech backend returning encoded audio (MP3).
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Bytes>;
}
