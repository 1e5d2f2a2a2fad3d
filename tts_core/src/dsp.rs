//! PCM post-processing applied to every synthesis result.
//!
//! Runs on the synthesis worker: trim leading and trailing silence, convert
//! from the model rate to the output rate, then pull loud peaks down to a
//! fixed target.

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;

/// Mono float PCM at a known sample rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcmBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PcmBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }
}

/// Drop leading and trailing samples quieter than `threshold`, keeping `pad`
/// samples of context on each side.
///
/// A buffer with no sample at or above the threshold is returned empty.
pub fn trim_silence(mut samples: Vec<f32>, threshold: f32, pad: usize) -> Vec<f32> {
    let Some(first) = samples.iter().position(|s| s.abs() >= threshold) else {
        samples.clear();
        return samples;
    };
    // `first` exists, so `last` does too
    let last = samples
        .iter()
        .rposition(|s| s.abs() >= threshold)
        .unwrap_or(first);

    let start = first.saturating_sub(pad);
    let end = (last + 1 + pad).min(samples.len());
    samples.truncate(end);
    samples.drain(..start);
    samples
}

/// Linear-interpolation resampler.
///
/// Produces `floor(len * out_rate / in_rate)` samples. Equal rates hand the
/// input back unchanged.
pub fn resample_linear(input: Vec<f32>, in_rate: u32, out_rate: u32) -> Vec<f32> {
    if in_rate == out_rate || input.is_empty() || in_rate == 0 {
        return input;
    }

    let out_len = (input.len() as u64 * out_rate as u64 / in_rate as u64) as usize;
    let step = in_rate as f64 / out_rate as f64;
    let last = input.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let i0 = (pos.floor() as usize).min(last);
            let i1 = (i0 + 1).min(last);
            let t = (pos - i0 as f64) as f32;
            input[i0] * (1.0 - t) + input[i1] * t
        })
        .collect()
}

/// Scale the buffer down so its absolute peak is `target`.
///
/// Gain is `min(4, target / peak)` and only applied when it attenuates, so
/// quiet speech is never boosted and a second pass is a no-op.
pub fn normalize_peak(samples: &mut [f32], target: f32) {
    if samples.is_empty() {
        return;
    }
    let peak = samples.iter().fold(1e-9_f32, |max, s| max.max(s.abs()));
    let gain = (target / peak).min(4.0);
    if gain < 1.0 {
        samples.iter_mut().for_each(|s| *s *= gain);
    }
}

/// Trim, resample and normalize in one pass over a model output.
#[derive(Debug, Clone, Copy)]
pub struct PostProcessor {
    pub silence_threshold: f32,
    /// Padding kept around speech, in model-rate samples
    pub silence_pad_samples: usize,
    pub target_peak: f32,
}

impl PostProcessor {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            silence_threshold: config.silence_threshold,
            silence_pad_samples: config.silence_pad_samples(),
            target_peak: config.target_peak,
        }
    }

    pub fn process(&self, pcm: PcmBuffer, out_rate: u32) -> PcmBuffer {
        let trimmed = trim_silence(pcm.samples, self.silence_threshold, self.silence_pad_samples);
        let mut samples = resample_linear(trimmed, pcm.sample_rate, out_rate);
        normalize_peak(&mut samples, self.target_peak);
        PcmBuffer::new(samples, out_rate)
    }
}

impl Default for PostProcessor {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_keeps_padding() {
        let mut samples = vec![0.0; 10];
        samples.extend([0.5, -0.4, 0.3]);
        samples.extend(vec![0.0; 10]);
        let trimmed = trim_silence(samples, 0.002, 2);
        assert_eq!(trimmed, vec![0.0, 0.0, 0.5, -0.4, 0.3, 0.0, 0.0]);
    }

    #[test]
    fn test_trim_pad_clamped_to_bounds() {
        let trimmed = trim_silence(vec![0.0, 0.5, 0.0], 0.002, 100);
        assert_eq!(trimmed, vec![0.0, 0.5, 0.0]);
    }

    #[test]
    fn test_trim_all_silent_is_empty() {
        assert!(trim_silence(vec![0.001; 50], 0.002, 10).is_empty());
        assert!(trim_silence(Vec::new(), 0.002, 10).is_empty());
    }

    #[test]
    fn test_resample_identity_returns_same_allocation() {
        let input = vec![0.1, 0.2, 0.3];
        let ptr = input.as_ptr();
        let out = resample_linear(input, 24_000, 24_000);
        assert_eq!(out.as_ptr(), ptr);
        assert_eq!(out, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_resample_length_and_interpolation() {
        let out = resample_linear(vec![0.0, 1.0, 0.0, -1.0], 24_000, 48_000);
        assert_eq!(out.len(), 8);
        assert!((out[1] - 0.5).abs() < 1e-6);
        assert!((out[2] - 1.0).abs() < 1e-6);
        // last output clamps to the final input sample
        assert!((out[7] + 1.0).abs() < 1e-6);

        let down = resample_linear(vec![0.0; 441], 44_100, 16_000);
        assert_eq!(down.len(), 160);
    }

    #[test]
    fn test_normalize_attenuates_loud_audio() {
        let mut samples = vec![0.5, -1.8, 0.9];
        normalize_peak(&mut samples, 0.9);
        assert!((samples[1] + 0.9).abs() < 1e-6);
        assert!((samples[0] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_never_boosts() {
        let mut samples = vec![0.1, -0.2];
        normalize_peak(&mut samples, 0.9);
        assert_eq!(samples, vec![0.1, -0.2]);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let mut once = vec![0.3, -2.5, 1.2, 0.0, 0.7];
        normalize_peak(&mut once, 0.9);
        let mut twice = once.clone();
        normalize_peak(&mut twice, 0.9);
        for (a, b) in once.iter().zip(&twice) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_process_chain() {
        let mut samples = vec![0.0; 1000];
        samples.extend(vec![2.0; 240]);
        samples.extend(vec![0.0; 1000]);
        let out = PostProcessor::default().process(PcmBuffer::new(samples, 24_000), 48_000);

        assert_eq!(out.sample_rate, 48_000);
        // 240 loud + 2 * 480 pad at 24 kHz, doubled
        assert_eq!(out.len(), (240 + 960) * 2);
        let peak = out.samples.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!((peak - 0.9).abs() < 1e-5);
    }

    #[test]
    fn test_padding_follows_model_rate() {
        let config = PipelineConfig {
            model_sample_rate: 16_000,
            silence_pad_ms: 10,
            ..Default::default()
        };
        let post = PostProcessor::from_config(&config);
        assert_eq!(post.silence_pad_samples, 160);

        let mut samples = vec![0.0; 400];
        samples.extend(vec![0.5; 100]);
        samples.extend(vec![0.0; 400]);
        let out = post.process(PcmBuffer::new(samples, 16_000), 16_000);
        assert_eq!(out.len(), 100 + 2 * 160);
    }

    #[test]
    fn test_process_silent_output_is_empty() {
        let out = PostProcessor::default().process(PcmBuffer::new(vec![0.0; 500], 24_000), 48_000);
        assert!(out.is_empty());
    }
}
