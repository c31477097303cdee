//! # Audio decoding
//!
//! Модуль для декодирования аудио в моно PCM семплы.
//!
//! Поддерживаются MP3, WAV, AAC и PCM через Symphonia. Многоканальное
//! аудио сводится в моно усреднением каналов.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use log::{debug, info, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{PracticeError, Result};

/// Decoded mono audio.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Mono samples in [-1, 1]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Seconds, `samples.len() / sample_rate`
    pub duration: f64,
}

impl DecodedAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        let duration = duration_in_seconds(samples.len(), sample_rate);
        Self {
            samples,
            sample_rate,
            duration,
        }
    }
}

/// Where the audio to analyse comes from.
#[derive(Debug, Clone)]
pub enum AudioSource {
    Bytes(Bytes),
    Path(PathBuf),
    Url(String),
}

/// Длительность в секундах по количеству семплов и частоте дискретизации.
pub fn duration_in_seconds(sample_count: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    sample_count as f64 / sample_rate as f64
}

/// Среднеквадратичное значение (RMS) для массива семплов.
pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|&s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Decodes an in-memory audio file (MP3, WAV, ...) into mono samples.
pub fn decode_audio_bytes(data: &[u8]) -> Result<DecodedAudio> {
    decode_with_hint(data.to_vec(), Hint::new())
}

/// Reads and decodes an audio file. The extension is used as a format hint.
pub fn decode_audio_file<P: AsRef<Path>>(file_path: P) -> Result<DecodedAudio> {
    let file_path = file_path.as_ref();

    let mut buffer = Vec::new();
    File::open(file_path)?.read_to_end(&mut buffer)?;

    let mut hint = Hint::new();
    if let Some(extension) = file_path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(&extension.to_lowercase());
    }

    let decoded = decode_with_hint(buffer, hint)?;
    info!(
        "Decoded {} ({:.2}s, {} Hz)",
        file_path.display(),
        decoded.duration,
        decoded.sample_rate
    );
    Ok(decoded)
}

/// Fetches (if needed) and decodes an audio source off the async runtime.
///
/// Every way of failing to read the audio is reported as
/// [`PracticeError::DecodeFailure`], so callers can fall back uniformly.
pub async fn decode_source(source: &AudioSource, client: &reqwest::Client) -> Result<DecodedAudio> {
    let data = match source {
        AudioSource::Bytes(bytes) => bytes.clone(),
        AudioSource::Path(path) => {
            let path = path.clone();
            return run_blocking(move || decode_audio_file(path)).await;
        }
        AudioSource::Url(url) => {
            debug!("Fetching audio from {}", url);
            fetch_bytes(client, url)
                .await
                .map_err(|e| PracticeError::DecodeFailure(format!("cannot fetch {}: {}", url, e)))?
        }
    };

    run_blocking(move || decode_audio_bytes(&data)).await
}

async fn fetch_bytes(client: &reqwest::Client, url: &str) -> Result<Bytes> {
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.bytes().await?)
}

async fn run_blocking<F>(job: F) -> Result<DecodedAudio>
where
    F: FnOnce() -> Result<DecodedAudio> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| PracticeError::DecodeFailure(format!("decoder task failed: {}", e)))?;

    result.map_err(|e| match e {
        PracticeError::DecodeFailure(_) => e,
        other => PracticeError::DecodeFailure(other.to_string()),
    })
}

fn decode_with_hint(data: Vec<u8>, hint: Hint) -> Result<DecodedAudio> {
    if data.is_empty() {
        return Err(PracticeError::DecodeFailure("empty audio data".to_string()));
    }

    let cursor = std::io::Cursor::new(data);
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let format_opts = FormatOptions {
        enable_gapless: true,
        ..Default::default()
    };

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &format_opts, &MetadataOptions::default())
        .map_err(|e| PracticeError::DecodeFailure(format!("unrecognised audio format: {}", e)))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| PracticeError::DecodeFailure("no audio track found".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| PracticeError::DecodeFailure(format!("unsupported codec: {}", e)))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut pcm_data = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            // Конец потока
            Err(SymphoniaError::IoError(_)) => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(PracticeError::DecodeFailure(format!("cannot read packet: {}", e)));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                let channels = spec.channels.count().max(1);

                let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                sample_buf.copy_interleaved_ref(decoded);

                // Сводим каналы в моно
                if channels > 1 {
                    pcm_data.extend(
                        sample_buf
                            .samples()
                            .chunks(channels)
                            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
                    );
                } else {
                    pcm_data.extend_from_slice(sample_buf.samples());
                }
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => {
                return Err(PracticeError::DecodeFailure(format!("decoder error: {}", e)));
            }
        }
    }

    if pcm_data.is_empty() || sample_rate == 0 {
        return Err(PracticeError::DecodeFailure("no audio samples decoded".to_string()));
    }

    debug!("Decoded {} samples at {} Hz", pcm_data.len(), sample_rate);
    Ok(DecodedAudio::new(pcm_data, sample_rate))
}
