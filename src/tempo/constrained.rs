use crate::audio::analyzer::{Aggregate, OnsetAnalyzer};
use crate::audio::dsp;
use crate::audio::types::{BeatGrid, SampleBuffer, TempoCandidate, TempoEstimate, TempoMethod};
use crate::config::{ConstrainedConfig, TempoConfig};
use crate::error::{Result, TempoError};
use crate::tempo::{
    correct_octave, ensure_min_duration, ensure_signal, envelope_tempo, TempoEstimationStrategy,
    TempoEstimator,
};

/// Band-limited autocorrelation peak picking with octave correction
#[derive(Debug, Clone)]
pub struct ConstrainedEstimator {
    config: ConstrainedConfig,
    min_duration_secs: f64,
}

impl ConstrainedEstimator {
    pub fn new(bpm_min: f64, bpm_max: f64, anchor_bpm: f64) -> Self {
        Self {
            config: ConstrainedConfig {
                bpm_min,
                bpm_max,
                anchor_bpm,
                ..ConstrainedConfig::default()
            },
            min_duration_secs: TempoConfig::default().min_duration_secs,
        }
    }

    pub fn from_config(config: &ConstrainedConfig, min_duration_secs: f64) -> Self {
        Self {
            config: config.clone(),
            min_duration_secs,
        }
    }

    /// Smoothed, median-filtered autocorrelation of the onset envelope and its frame rate
    fn onset_autocorrelation(&self, buffer: &SampleBuffer) -> Result<(Vec<f64>, f64)> {
        let config = &self.config;
        let emphasized = dsp::preemphasis(buffer.samples(), config.preemphasis);
        let half_rate = (buffer.sample_rate() / 2).max(1);
        let downsampled = dsp::resample(&emphasized, buffer.sample_rate(), half_rate)?;
        let downsampled = SampleBuffer::new(downsampled, half_rate)?;

        let envelope = OnsetAnalyzer::new(config.n_fft, config.hop_length)
            .with_aggregate(Aggregate::Mean)
            .envelope(&downsampled)?;
        envelope.ensure_informative()?;

        let smoothed = dsp::savgol_filter(
            &envelope.values,
            config.savgol_window,
            config.savgol_polyorder,
        );
        let normalized =
            dsp::normalize_peak(&smoothed).ok_or_else(|| TempoError::DegenerateSignal {
                reason: "smoothed onset envelope is flat".to_string(),
            })?;

        let ac = dsp::autocorrelate(&normalized, normalized.len())?;
        Ok((dsp::median_filter(&ac, config.median_kernel), envelope.frame_rate))
    }

    fn log_sanity_check(&self, buffer: &SampleBuffer, bpm: f64) {
        let sanity = OnsetAnalyzer::new(2048, 512)
            .envelope(buffer)
            .and_then(|envelope| envelope_tempo(&envelope, self.config.anchor_bpm));
        match sanity {
            Ok(reference) => tracing::debug!(
                "Sanity check: {:.2} BPM from envelope periodicity vs {:.0} BPM constrained",
                reference,
                bpm
            ),
            Err(e) => tracing::debug!("Sanity check unavailable: {}", e),
        }
    }
}

/// Half-open lag range `[lag_min, end)` for a BPM band over `available` lags
pub fn lag_range(rate: f64, bpm_min: f64, bpm_max: f64, available: usize) -> Result<(usize, usize)> {
    let mut lag_min = (rate * 60.0 / bpm_max) as usize;
    let mut lag_max = (rate * 60.0 / bpm_min) as usize;

    if lag_max > available {
        lag_max = available;
    }
    if lag_min > available {
        lag_min = available / 2;
    }

    let end = lag_max;
    if lag_min >= available || lag_min >= end {
        return Err(TempoError::RangeExceeded {
            lag_min,
            lag_max,
            available,
        }
        .into());
    }

    Ok((lag_min, end))
}

/// Tallest qualifying peak of `ac` inside `[lag_min, end)`, refined to sub-lag precision
pub fn dominant_lag(ac: &[f64], lag_min: usize, end: usize, threshold: f64) -> Option<f64> {
    let band = &ac[lag_min..end];
    let band_max = band.iter().cloned().fold(f64::MIN, f64::max);
    let min_height = threshold * band_max;

    // One extra lag either side so peaks on the band edges are still detected
    let lo = lag_min.saturating_sub(1);
    let hi = (end + 1).min(ac.len());
    let peak = dsp::find_peaks(&ac[lo..hi], min_height)
        .into_iter()
        .map(|p| p + lo)
        .filter(|&p| p >= lag_min && p < end)
        .max_by(|&a, &b| {
            ac[a]
                .partial_cmp(&ac[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;

    let offset = if peak >= 1 && peak + 1 < ac.len() {
        dsp::parabolic_offset(ac[peak - 1], ac[peak], ac[peak + 1])
    } else {
        0.0
    };
    Some(peak as f64 + offset)
}

impl TempoEstimator for ConstrainedEstimator {
    fn name(&self) -> &str {
        "constrained_autocorrelation"
    }

    fn strategy(&self) -> TempoEstimationStrategy {
        TempoEstimationStrategy::ConstrainedAutocorrelation
    }

    fn estimate(&self, buffer: &SampleBuffer) -> Result<TempoEstimate> {
        let config = &self.config;
        ensure_min_duration(buffer, self.min_duration_secs)?;
        ensure_signal(buffer)?;

        let (ac, frame_rate) = self.onset_autocorrelation(buffer)?;
        let (lag_min, end) = lag_range(frame_rate, config.bpm_min, config.bpm_max, ac.len())?;

        let lag = dominant_lag(&ac, lag_min, end, config.peak_threshold).ok_or(
            TempoError::NoDominantPeak {
                bpm_min: config.bpm_min,
                bpm_max: config.bpm_max,
            },
        )?;

        let raw = frame_rate * 60.0 / lag;
        let bpm = correct_octave(raw, config.anchor_bpm).round();

        tracing::debug!(
            "Autocorrelation lags {}..{} at {:.2} fps; peak at lag {:.2} -> {:.2} BPM",
            lag_min,
            end,
            frame_rate,
            lag,
            raw
        );
        tracing::info!("Constrained tempo: {:.0} BPM", bpm);

        if config.sanity_check && tracing::enabled!(tracing::Level::DEBUG) {
            self.log_sanity_check(buffer, bpm);
        }

        Ok(TempoEstimate {
            bpm,
            candidates: vec![TempoCandidate {
                method: TempoMethod::ConstrainedAutocorrelation,
                bpm,
                weight: 1.0,
            }],
            beats: BeatGrid::empty(),
            strategy: TempoEstimationStrategy::ConstrainedAutocorrelation,
        })
    }
}
