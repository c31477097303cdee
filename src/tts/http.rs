//! # HTTP speech client
//!
//! Модуль для обращения к серверному эндпоинту синтеза речи.
//! Сервер принимает JSON с текстом и параметрами голоса и возвращает MP3.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use log::{error, info, warn};
use reqwest::{header, Client, StatusCode};
use serde_json::Value;

use crate::config::SynthesisConfig;
use crate::error::{PracticeError, Result};
use crate::tts::synthesizer::{SpeechSynthesizer, SynthesisRequest};

/// Speech backend reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSpeechClient {
    client: Client,
    endpoint: String,
    max_attempts: u32,
}

impl HttpSpeechClient {
    pub fn new(config: &SynthesisConfig) -> Result<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(PracticeError::Configuration(
                "synthesis endpoint is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            max_attempts: config.max_attempts.max(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechClient {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Bytes> {
        let body = SynthesisRequest {
            text: preprocess_text(&request.text),
            ..request.clone()
        };

        if body.text.is_empty() {
            return Err(PracticeError::SynthesisFailure("nothing to synthesize".to_string()));
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            info!(
                "Sending synthesis request for '{}' (attempt {}/{})",
                body.text, attempts, self.max_attempts
            );

            let response = self
                .client
                .post(&self.endpoint)
                .header(header::CONTENT_TYPE, "application/json")
                .json(&body)
                .send()
                .await;

            let retry_reason = match response {
                Ok(resp) if resp.status().is_success() => {
                    let audio = resp.bytes().await.map_err(|e| {
                        PracticeError::SynthesisFailure(format!("cannot read audio body: {}", e))
                    })?;
                    if audio.is_empty() {
                        return Err(PracticeError::SynthesisFailure(
                            "backend returned an empty audio body".to_string(),
                        ));
                    }
                    info!("Received {} bytes of synthesized audio", audio.len());
                    return Ok(audio);
                }
                Ok(resp) => {
                    let status = resp.status();
                    let error_text = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "no error body".to_string());
                    let message = extract_error_message(&error_text);
                    error!("Synthesis backend error (status {}): {}", status, message);

                    if !is_retryable(status) {
                        return Err(PracticeError::SynthesisFailure(format!(
                            "backend error ({}): {}",
                            status, message
                        )));
                    }
                    format!("backend error ({}): {}", status, message)
                }
                Err(e) => {
                    error!("Synthesis request failed: {}", e);
                    format!("request failed: {}", e)
                }
            };

            if attempts >= self.max_attempts {
                return Err(PracticeError::SynthesisFailure(retry_reason));
            }

            let wait_time = Duration::from_secs(2u64.pow(attempts));
            warn!("Retrying synthesis in {} seconds...", wait_time.as_secs());
            tokio::time::sleep(wait_time).await;
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Достаём `error.message` или `error` из JSON, иначе возвращаем текст как есть
fn extract_error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(json) => json["error"]["message"]
            .as_str()
            .or_else(|| json["error"].as_str())
            .unwrap_or(body)
            .to_string(),
        Err(_) => body.to_string(),
    }
}

/// Trims and collapses whitespace before sending text to the backend.
fn preprocess_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
