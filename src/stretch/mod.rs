//! # Time Stretch Module
//!
//! Tempo changes without pitch changes: STFT, phase vocoder resampling of the
//! frame sequence, then overlap-add resynthesis.

pub mod phase_vocoder;

pub use phase_vocoder::phase_vocoder;

use crate::audio::dsp::Stft;
use crate::audio::types::SampleBuffer;
use crate::config::StretchConfig;
use crate::error::{Result, StretchError};

/// Pitch-preserving time stretcher
#[derive(Debug, Clone)]
pub struct TimeStretcher {
    n_fft: usize,
    hop_length: usize,
}

impl Default for TimeStretcher {
    fn default() -> Self {
        Self::with_config(&StretchConfig::default())
    }
}

impl TimeStretcher {
    pub fn new(n_fft: usize, hop_length: usize) -> Self {
        Self { n_fft, hop_length }
    }

    pub fn with_config(config: &StretchConfig) -> Self {
        Self::new(config.n_fft, config.hop_length)
    }

    /// Playback-rate ratio `target / current`
    pub fn ratio_from_bpm(current_bpm: f64, target_bpm: f64) -> Result<f64> {
        let valid = |bpm: f64| bpm.is_finite() && bpm > 0.0;
        if !valid(current_bpm) || !valid(target_bpm) {
            return Err(StretchError::InvalidStretchRatio {
                current_bpm,
                target_bpm,
            }
            .into());
        }
        Ok(target_bpm / current_bpm)
    }

    /// Stretch a buffer from `current_bpm` to `target_bpm`
    ///
    /// The output holds exactly `round(len * current / target)` samples at the
    /// input's sample rate. Equal tempos return the input unchanged.
    pub fn stretch(
        &self,
        buffer: &SampleBuffer,
        current_bpm: f64,
        target_bpm: f64,
    ) -> Result<SampleBuffer> {
        let ratio = Self::ratio_from_bpm(current_bpm, target_bpm)?;
        if current_bpm == target_bpm {
            tracing::debug!("Tempo already at {:.2} BPM, skipping stretch", target_bpm);
            return Ok(buffer.clone());
        }

        let stretched = self.stretch_by_ratio(buffer, ratio)?;
        tracing::debug!(
            "Stretched {:.2} -> {:.2} BPM (ratio {:.4}): {} -> {} samples",
            current_bpm,
            target_bpm,
            ratio,
            buffer.len(),
            stretched.len()
        );
        Ok(stretched)
    }

    /// Stretch by a playback-rate ratio (`> 1` shortens)
    pub fn stretch_by_ratio(&self, buffer: &SampleBuffer, ratio: f64) -> Result<SampleBuffer> {
        let length = ((buffer.len() as f64 / ratio).round() as usize).max(1);

        let stft = Stft::new(self.n_fft, self.hop_length);
        let frames = stft.forward(buffer.samples())?;
        let modified = phase_vocoder(&frames, ratio, self.hop_length, self.n_fft);
        let samples = stft.inverse(&modified, length)?;

        buffer.with_samples(samples)
    }
}
