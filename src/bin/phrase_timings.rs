//! Diagnostic tool: splits a text into phrases and prints their timings
//! inside an audio track as JSON.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use phrase_practice::utils::logger::{init_logger, init_logger_with};
use phrase_practice::{prepare_material, AudioSource, PracticeConfig};

#[derive(Parser, Debug)]
#[command(name = "phrase-timings", about = "Time the phrases of a text inside an audio track")]
struct Args {
    /// Text file with the practice text
    #[arg(long)]
    text: PathBuf,

    /// Audio track with the text read aloud (MP3, WAV, AAC)
    #[arg(long)]
    audio: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Silence threshold as RMS amplitude
    #[arg(long)]
    threshold: Option<f32>,

    /// Minimum pause length in seconds
    #[arg(long)]
    min_silence: Option<f64>,

    /// Track length in seconds, used when the audio cannot be decoded
    #[arg(long)]
    duration: Option<f64>,

    /// Print detected pauses and enable debug logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.verbose {
        init_logger_with("warn,phrase_practice=debug");
    } else {
        init_logger();
    }

    let mut config = match &args.config {
        Some(path) => PracticeConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => PracticeConfig::default(),
    };
    if let Some(threshold) = args.threshold {
        config.silence.threshold = threshold;
    }
    if let Some(min_silence) = args.min_silence {
        config.silence.min_silence_duration = min_silence;
    }
    config.validate().context("Invalid configuration")?;

    let text = std::fs::read_to_string(&args.text)
        .with_context(|| format!("Failed to read text from {}", args.text.display()))?;
    let source = args.audio.clone().map(AudioSource::Path);

    let client = reqwest::Client::new();
    let material = prepare_material(&text, source.as_ref(), args.duration, &config, &client)
        .await
        .context("Failed to prepare practice material")?;
    info!("Prepared {} phrases", material.phrases.len());

    let output = if args.verbose {
        serde_json::to_string_pretty(&material)?
    } else {
        match &material.plan {
            Some(plan) => serde_json::to_string_pretty(plan)?,
            None => serde_json::to_string_pretty(&material.phrases)?,
        }
    };
    println!("{}", output);

    Ok(())
}
