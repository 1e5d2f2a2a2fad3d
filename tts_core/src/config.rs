// Configuration for the speech pipeline

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default Kitten TTS model rate.
pub const DEFAULT_MODEL_SAMPLE_RATE: u32 = 24_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub model_path: PathBuf,
    pub voices_path: PathBuf,
    /// Native rate of the inference model output
    pub model_sample_rate: u32,
    /// Rate the render thread plays at
    pub output_sample_rate: u32,
    /// Samples produced per render callback
    pub quantum_samples: usize,
    pub fade_ms: u32,
    pub silence_threshold: f32,
    pub silence_pad_ms: u32,
    pub target_peak: f32,
    pub max_tokens: usize,
    /// Soft cap on unplayed audio held by the playback queue
    pub max_queued_secs: u32,
    pub default_speed: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("tts-model/kitten_tts_nano_v0_1.onnx"),
            voices_path: PathBuf::from("tts-model/voices.json"),
            model_sample_rate: DEFAULT_MODEL_SAMPLE_RATE,
            output_sample_rate: 48_000,
            quantum_samples: 128,
            fade_ms: 20,
            silence_threshold: 0.002,
            silence_pad_ms: 20,
            target_peak: 0.9,
            max_tokens: 120,
            max_queued_secs: 120,
            default_speed: 1.0,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let model_path = std::env::var("TTS_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.model_path);

        let voices_path = std::env::var("TTS_VOICES_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.voices_path);

        Self {
            model_path,
            voices_path,
            model_sample_rate: env_nonzero("TTS_MODEL_SAMPLE_RATE").unwrap_or(defaults.model_sample_rate),
            output_sample_rate: env_nonzero("TTS_OUTPUT_SAMPLE_RATE").unwrap_or(defaults.output_sample_rate),
            quantum_samples: env_nonzero("TTS_QUANTUM_SAMPLES").unwrap_or(defaults.quantum_samples),
            fade_ms: env_parse("TTS_FADE_MS").unwrap_or(defaults.fade_ms),
            silence_threshold: env_parse("TTS_SILENCE_THRESHOLD").unwrap_or(defaults.silence_threshold),
            silence_pad_ms: env_parse("TTS_SILENCE_PAD_MS").unwrap_or(defaults.silence_pad_ms),
            target_peak: env_parse("TTS_TARGET_PEAK").unwrap_or(defaults.target_peak),
            max_tokens: env_parse("TTS_MAX_TOKENS").unwrap_or(defaults.max_tokens),
            max_queued_secs: env_parse("TTS_MAX_QUEUED_SECS").unwrap_or(defaults.max_queued_secs),
            default_speed: env_parse("TTS_DEFAULT_SPEED").unwrap_or(defaults.default_speed),
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.model_sample_rate == 0 || self.output_sample_rate == 0 {
            anyhow::bail!(
                "sample rates must be positive (model {}, output {})",
                self.model_sample_rate,
                self.output_sample_rate
            );
        }
        if self.quantum_samples == 0 {
            anyhow::bail!("quantum_samples must be positive");
        }
        Ok(())
    }

    /// Cross-fade length in output samples
    pub fn fade_samples(&self) -> usize {
        ms_to_samples(self.fade_ms, self.output_sample_rate)
    }

    /// Silence-trim padding in model-rate samples
    pub fn silence_pad_samples(&self) -> usize {
        ms_to_samples(self.silence_pad_ms, self.model_sample_rate)
    }

    pub fn max_queued_samples(&self) -> usize {
        self.max_queued_secs as usize * self.output_sample_rate as usize
    }

    /// Wall-clock length of one render quantum
    pub fn quantum_duration(&self) -> Duration {
        let rate = self.output_sample_rate.max(1);
        Duration::from_secs_f64(self.quantum_samples as f64 / rate as f64)
    }
}

pub fn ms_to_samples(ms: u32, sample_rate: u32) -> usize {
    (ms as u64 * sample_rate as u64 / 1000) as usize
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Like [`env_parse`], but a zero value falls back to the default.
fn env_nonzero<T: std::str::FromStr + Default + PartialEq>(key: &str) -> Option<T> {
    let value = env_parse(key)?;
    if value == T::default() {
        warn!("{key} must be greater than zero, using the default");
        return None;
    }
    Some(value)
}
