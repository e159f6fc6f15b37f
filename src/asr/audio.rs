//! Audio processing utilities.
//!
//! Raw request audio is converted to the normalised 16 kHz waveform the
//! acoustic model consumes, then cut into inference windows.

use crate::config::audio::{CHUNK_SAMPLES, FRAME_STRIDE_SAMPLES, MODEL_SAMPLE_RATE};
use crate::error::{AppError, Result};
use tracing::debug;

/// Convert raw audio bytes (16-bit PCM) to floating point samples.
///
/// # Arguments
/// * `audio_bytes` - Raw audio bytes in 16-bit little-endian PCM format
///
/// # Returns
/// Vector of f32 samples normalized to [-1.0, 1.0]
pub fn bytes_to_f32_samples(audio_bytes: &[u8]) -> Vec<f32> {
    audio_bytes
        .chunks_exact(2)
        .map(|chunk| {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            sample as f32 / 32768.0
        })
        .collect()
}

/// Resample `samples` from `from_rate` to `to_rate` with linear interpolation.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = ((samples.len() as f64) / ratio).round().max(1.0) as usize;
    let last = samples.len() - 1;

    (0..output_len)
        .map(|i| {
            let position = i as f64 * ratio;
            let index = (position.floor() as usize).min(last);
            let next = (index + 1).min(last);
            let fraction = (position - index as f64) as f32;
            samples[index] + (samples[next] - samples[index]) * fraction
        })
        .collect()
}

/// Normalise to zero mean and unit variance, in place.
pub fn normalize(samples: &mut [f32]) {
    if samples.is_empty() {
        return;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().map(|&s| s as f64).sum::<f64>() / n;
    let variance = samples.iter().map(|&s| (s as f64 - mean).powi(2)).sum::<f64>() / n;
    let scale = 1.0 / (variance + 1e-7).sqrt();
    for sample in samples.iter_mut() {
        *sample = ((*sample as f64 - mean) * scale) as f32;
    }
}

/// Turn request audio into the model input waveform.
///
/// # Arguments
/// * `audio` - Raw 16-bit PCM mono bytes
/// * `sample_rate_hz` - Sample rate of `audio`
pub fn preprocess(audio: &[u8], sample_rate_hz: u32) -> Result<Vec<f32>> {
    if audio.len() < 2 {
        return Err(AppError::Audio("Audio must contain at least one sample".to_string()));
    }
    if sample_rate_hz == 0 {
        return Err(AppError::Audio("Sample rate cannot be zero".to_string()));
    }

    let samples = bytes_to_f32_samples(audio);
    let mut waveform = resample_linear(&samples, sample_rate_hz, MODEL_SAMPLE_RATE);
    normalize(&mut waveform);
    Ok(waveform)
}

/// One inference window over the model waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// First sample, including left context
    pub begin: usize,

    /// One past the last sample
    pub end: usize,

    /// Leading output frames that belong to the previous window
    pub skip_frames: usize,
}

/// Cut `total_len` samples into windows of [`CHUNK_SAMPLES`], adding
/// `overlap_frames` frames of left context to every window after the first.
pub fn plan_windows(total_len: usize, overlap_frames: usize) -> Vec<Window> {
    plan_windows_with(total_len, CHUNK_SAMPLES, overlap_frames * FRAME_STRIDE_SAMPLES)
}

fn plan_windows_with(total_len: usize, chunk: usize, overlap_samples: usize) -> Vec<Window> {
    let mut windows = Vec::with_capacity(total_len.div_ceil(chunk.max(1)));
    let mut start = 0;

    while start < total_len {
        let end = (start + chunk).min(total_len);
        let begin = start.saturating_sub(overlap_samples);
        windows.push(Window {
            begin,
            end,
            skip_frames: (start - begin) / FRAME_STRIDE_SAMPLES,
        });
        start = end;
    }

    debug!(
        "Planned {} windows over {} samples ({} samples overlap)",
        windows.len(),
        total_len,
        overlap_samples
    );
    windows
}
