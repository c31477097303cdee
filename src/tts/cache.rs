//! Модуль для кэширования результатов синтеза речи
//!
//! Повторные запросы с тем же текстом и голосом не уходят в бэкенд.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use parking_lot::Mutex;

use crate::config::SynthesisConfig;
use crate::error::Result;
use crate::tts::http::HttpSpeechClient;
use crate::tts::synthesizer::{SpeechSynthesizer, SynthesisRequest};

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Bytes>,
    /// Порядок добавления для вытеснения самых старых записей
    order: VecDeque<String>,
}

/// Bounded in-memory cache in front of another synthesizer.
pub struct CachedSynthesizer<S> {
    inner: S,
    capacity: usize,
    state: Mutex<CacheState>,
}

impl<S: SpeechSynthesizer> CachedSynthesizer<S> {
    /// A capacity of 0 disables caching.
    pub fn new(inner: S, capacity: usize) -> Self {
        Self {
            inner,
            capacity,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.order.clear();
    }

    fn insert(&self, key: String, audio: Bytes) {
        if self.capacity == 0 {
            return;
        }

        let mut state = self.state.lock();
        if state.entries.insert(key.clone(), audio).is_none() {
            state.order.push_back(key);
        }
        while state.order.len() > self.capacity {
            if let Some(oldest) = state.order.pop_front() {
                state.entries.remove(&oldest);
            }
        }
    }
}

impl CachedSynthesizer<HttpSpeechClient> {
    /// HTTP client behind a cache sized by `config.cache_capacity`.
    pub fn from_config(config: &SynthesisConfig) -> Result<Self> {
        let client = HttpSpeechClient::new(config)?;
        debug!(
            "Speech client for {} with cache of {} clips",
            client.endpoint(),
            config.cache_capacity
        );
        Ok(Self::new(client, config.cache_capacity))
    }
}

/// Ключ кэша: md5 от текста и всех параметров голоса
pub fn cache_key(request: &SynthesisRequest) -> String {
    let mut hasher = md5::Context::new();
    hasher.consume(request.text.as_bytes());
    hasher.consume(request.voice_id.as_bytes());
    hasher.consume(request.language_code.as_bytes());
    hasher.consume(request.speaking_rate.to_le_bytes());
    hasher.consume(request.pitch.to_le_bytes());
    hasher.consume([request.use_ssml as u8]);

    format!("{:x}", hasher.compute())
}

#[async_trait]
impl<S: SpeechSynthesizer> SpeechSynthesizer for CachedSynthesizer<S> {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Bytes> {
        let key = cache_key(request);

        if let Some(audio) = self.state.lock().entries.get(&key).cloned() {
            debug!("Using cached synthesis for '{}'", request.text);
            return Ok(audio);
        }

        let audio = self.inner.synthesize(request).await?;
        self.insert(key, audio.clone());
        Ok(audio)
    }
}
