use serde::{Deserialize, Serialize};

use crate::audio::dsp::{self, Stft};
use crate::audio::types::SampleBuffer;
use crate::error::{Result, TempoError};

/// Floor of the dB spectrogram relative to its loudest bin
const TOP_DB: f32 = 80.0;

/// Smallest power considered when converting to dB
const AMIN: f32 = 1e-10;

/// How per-band onset strength is reduced to one value per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    #[default]
    Mean,
    /// Suppresses transient spikes confined to a few bands
    Median,
}

/// Onset strength over time, one value per analysis frame
#[derive(Debug, Clone)]
pub struct OnsetEnvelope {
    pub values: Vec<f32>,

    /// Frames per second
    pub frame_rate: f64,
}

impl OnsetEnvelope {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Fail with `DegenerateSignal` for NaN or constant envelopes
    pub fn ensure_informative(&self) -> Result<()> {
        if self.values.iter().any(|v| !v.is_finite()) {
            return Err(TempoError::DegenerateSignal {
                reason: "onset envelope contains non-finite values".to_string(),
            }
            .into());
        }

        let max = self.values.iter().fold(f32::MIN, |acc, &x| acc.max(x));
        let min = self.values.iter().fold(f32::MAX, |acc, &x| acc.min(x));
        if self.values.len() < 3 || max - min <= f32::EPSILON {
            return Err(TempoError::DegenerateSignal {
                reason: format!("onset envelope is flat ({} frames)", self.values.len()),
            }
            .into());
        }

        Ok(())
    }

    /// Time in seconds of a frame index
    pub fn frame_time(&self, frame: usize) -> f64 {
        frame as f64 / self.frame_rate
    }
}

/// Spectral-flux onset detector over a mel spectrogram
pub struct OnsetAnalyzer {
    n_fft: usize,
    hop_length: usize,
    n_mels: usize,
    aggregate: Aggregate,
}

impl OnsetAnalyzer {
    pub fn new(n_fft: usize, hop_length: usize) -> Self {
        Self {
            n_fft,
            hop_length,
            n_mels: 128,
            aggregate: Aggregate::Mean,
        }
    }

    pub fn with_aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = aggregate;
        self
    }

    /// Compute the onset strength envelope of a buffer
    pub fn envelope(&self, buffer: &SampleBuffer) -> Result<OnsetEnvelope> {
        let stft = Stft::new(self.n_fft, self.hop_length);
        let power = stft.power(buffer.samples())?;
        let filterbank = MelFilterbank::new(self.n_mels, self.n_fft, buffer.sample_rate());

        let mut mel_db: Vec<Vec<f32>> = power
            .iter()
            .map(|frame| {
                filterbank
                    .apply(frame)
                    .into_iter()
                    .map(|p| 10.0 * p.max(AMIN).log10())
                    .collect()
            })
            .collect();

        let loudest = mel_db
            .iter()
            .flatten()
            .fold(f32::MIN, |acc, &x| acc.max(x));
        let floor = loudest - TOP_DB;
        for value in mel_db.iter_mut().flatten() {
            *value = value.max(floor);
        }

        let flux: Vec<f32> = mel_db
            .windows(2)
            .map(|pair| {
                let rises: Vec<f32> = pair[1]
                    .iter()
                    .zip(&pair[0])
                    .map(|(&curr, &prev)| (curr - prev).max(0.0))
                    .collect();
                match self.aggregate {
                    Aggregate::Mean => rises.iter().sum::<f32>() / rises.len().max(1) as f32,
                    Aggregate::Median => dsp::median(&rises),
                }
            })
            .collect();

        // Shift so that peaks land on the onset rather than on the first frame whose window touches it
        let delay = 1 + self.n_fft / (2 * self.hop_length);
        let frames = mel_db.len();
        let mut values = vec![0.0f32; delay.min(frames)];
        values.extend(flux);
        values.truncate(frames);

        let frame_rate = buffer.sample_rate() as f64 / self.hop_length as f64;

        tracing::debug!(
            "Onset envelope: {} frames at {:.2} fps ({:?} aggregation)",
            values.len(),
            frame_rate,
            self.aggregate
        );

        Ok(OnsetEnvelope { values, frame_rate })
    }
}

/// Triangular mel filters (Slaney scale, area-normalized), stored sparsely
struct MelFilterbank {
    filters: Vec<(usize, Vec<f32>)>,
}

impl MelFilterbank {
    fn new(n_mels: usize, n_fft: usize, sample_rate: u32) -> Self {
        let n_bins = n_fft / 2 + 1;
        let nyquist = sample_rate as f64 / 2.0;
        let max_mel = hz_to_mel(nyquist);

        let edges: Vec<f64> = (0..n_mels + 2)
            .map(|i| mel_to_hz(max_mel * i as f64 / (n_mels + 1) as f64))
            .collect();
        let bin_hz = sample_rate as f64 / n_fft as f64;

        let filters = (0..n_mels)
            .map(|m| {
                let (lower, center, upper) = (edges[m], edges[m + 1], edges[m + 2]);
                let norm = 2.0 / (upper - lower);
                let first = ((lower / bin_hz).floor() as usize).min(n_bins - 1);
                let last = ((upper / bin_hz).ceil() as usize).min(n_bins - 1);

                let weights = (first..=last)
                    .map(|bin| {
                        let hz = bin as f64 * bin_hz;
                        let rising = (hz - lower) / (center - lower);
                        let falling = (upper - hz) / (upper - center);
                        (rising.min(falling).max(0.0) * norm) as f32
                    })
                    .collect();
                (first, weights)
            })
            .collect();

        Self { filters }
    }

    fn apply(&self, power: &[f32]) -> Vec<f32> {
        self.filters
            .iter()
            .map(|(first, weights)| {
                weights
                    .iter()
                    .zip(&power[*first..])
                    .map(|(&w, &p)| w * p)
                    .sum::<f32>()
            })
            .collect()
    }
}

const MEL_F_SP: f64 = 200.0 / 3.0;
const MEL_MIN_LOG_HZ: f64 = 1000.0;

fn mel_log_step() -> f64 {
    6.4f64.ln() / 27.0
}

fn hz_to_mel(hz: f64) -> f64 {
    let min_log_mel = MEL_MIN_LOG_HZ / MEL_F_SP;
    if hz >= MEL_MIN_LOG_HZ {
        min_log_mel + (hz / MEL_MIN_LOG_HZ).ln() / mel_log_step()
    } else {
        hz / MEL_F_SP
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    let min_log_mel = MEL_MIN_LOG_HZ / MEL_F_SP;
    if mel >= min_log_mel {
        MEL_MIN_LOG_HZ * (mel_log_step() * (mel - min_log_mel)).exp()
    } else {
        MEL_F_SP * mel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::synth::ClickTrack;

    #[test]
    fn test_mel_scale_roundtrip() {
        for hz in [0.0, 440.0, 999.0, 1000.0, 4000.0, 11025.0] {
            assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() < 1e-6);
        }
        assert!((hz_to_mel(1000.0) - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_envelope_peaks_follow_clicks() {
        let buffer = ClickTrack::new(120.0, 6.0, 22050).render();
        let envelope = OnsetAnalyzer::new(2048, 512)
            .with_aggregate(Aggregate::Median)
            .envelope(&buffer)
            .unwrap();

        assert_eq!(envelope.len(), 1 + buffer.len() / 512);
        envelope.ensure_informative().unwrap();

        // The strongest frame near the 1.0s click must sit within ~2 hops of it
        let around = (envelope.frame_rate * 0.75) as usize..(envelope.frame_rate * 1.25) as usize;
        let peak = around
            .clone()
            .max_by(|&a, &b| envelope.values[a].partial_cmp(&envelope.values[b]).unwrap())
            .unwrap();
        assert!((envelope.frame_time(peak) - 1.0).abs() < 0.05, "peak at {}", envelope.frame_time(peak));
    }

    #[test]
    fn test_silence_is_degenerate() {
        let buffer = SampleBuffer::new(vec![0.0; 22050 * 2], 22050).unwrap();
        let envelope = OnsetAnalyzer::new(2048, 512).envelope(&buffer).unwrap();
        assert!(envelope.ensure_informative().is_err());
    }
}
