//! # Tempo Estimation Module
//!
//! Two interchangeable strategies for finding a track's BPM:
//!
//! - **Fusion**: three estimates from one onset envelope (an anchored beat
//!   tracker, envelope periodicity, and tracked beat intervals) blended with
//!   weights that favour values near an anchor tempo
//! - **Constrained autocorrelation**: smoothed onset autocorrelation searched
//!   only inside a BPM band, followed by octave correction and rounding
//!
//! Both implement [`TempoEstimator`], so callers pick one through
//! [`TempoEstimationStrategy`] without caring which heuristics run.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audio::dsp;
use crate::audio::types::{SampleBuffer, TempoEstimate};
use crate::audio::OnsetEnvelope;
use crate::config::Config;
use crate::error::{BeatmixError, Result, TempoError};

pub mod beat_tracker;
pub mod constrained;
pub mod fusion;

pub use beat_tracker::{BeatTracker, TrackedBeats};
pub use constrained::ConstrainedEstimator;
pub use fusion::FusionEstimator;

/// Longest lag considered when reading tempo off an onset envelope (seconds)
const MAX_TEMPO_LAG_SECS: f64 = 8.0;

/// Lags faster than this are never reported as the tempo
const MAX_TEMPO_BPM: f64 = 320.0;

/// A way of estimating tempo from a mono buffer
pub trait TempoEstimator: Send + Sync {
    /// Returns the unique name of this estimator
    fn name(&self) -> &str;

    /// Strategy this estimator implements
    fn strategy(&self) -> TempoEstimationStrategy;

    /// Estimate the tempo of a whole track
    fn estimate(&self, buffer: &SampleBuffer) -> Result<TempoEstimate>;
}

/// Selects which tempo estimator the pipeline uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempoEstimationStrategy {
    #[default]
    Fusion,
    #[serde(alias = "constrained")]
    ConstrainedAutocorrelation,
}

impl TempoEstimationStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fusion => "fusion",
            Self::ConstrainedAutocorrelation => "constrained_autocorrelation",
        }
    }

    /// Build the estimator for this strategy from configuration
    pub fn estimator(&self, config: &Config) -> Arc<dyn TempoEstimator> {
        match self {
            Self::Fusion => Arc::new(FusionEstimator::from_config(&config.tempo)),
            Self::ConstrainedAutocorrelation => Arc::new(ConstrainedEstimator::from_config(
                &config.constrained,
                config.tempo.min_duration_secs,
            )),
        }
    }
}

impl fmt::Display for TempoEstimationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TempoEstimationStrategy {
    type Err = BeatmixError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fusion" => Ok(Self::Fusion),
            "constrained" | "constrained_autocorrelation" => Ok(Self::ConstrainedAutocorrelation),
            other => Err(BeatmixError::generic(format!(
                "unknown tempo strategy '{}' (expected 'fusion' or 'constrained')",
                other
            ))),
        }
    }
}

/// Fusion estimate over the first `analysis_window_secs` of a buffer
pub fn estimate_tempo(
    buffer: &SampleBuffer,
    analysis_window_secs: f64,
    anchor_bpm: f64,
) -> Result<TempoEstimate> {
    FusionEstimator::new(analysis_window_secs, anchor_bpm).estimate(buffer)
}

/// Constrained autocorrelation estimate searched within `[bpm_min, bpm_max]`
pub fn estimate_tempo_constrained(
    buffer: &SampleBuffer,
    bpm_min: f64,
    bpm_max: f64,
    anchor_bpm: f64,
) -> Result<TempoEstimate> {
    ConstrainedEstimator::new(bpm_min, bpm_max, anchor_bpm).estimate(buffer)
}

/// A tempo, its half and its double
pub fn octave_candidates(bpm: f64) -> [f64; 3] {
    [bpm, bpm / 2.0, bpm * 2.0]
}

/// Pick the octave of `bpm` closest to `anchor_bpm`
pub fn correct_octave(bpm: f64, anchor_bpm: f64) -> f64 {
    octave_candidates(bpm)
        .into_iter()
        .fold(bpm, |best, candidate| {
            if (candidate - anchor_bpm).abs() < (best - anchor_bpm).abs() {
                candidate
            } else {
                best
            }
        })
}

/// Fail with `InsufficientAudio` for buffers shorter than `required_secs`
pub fn ensure_min_duration(buffer: &SampleBuffer, required_secs: f64) -> Result<()> {
    let duration = buffer.duration_secs();
    if duration < required_secs {
        return Err(TempoError::InsufficientAudio {
            duration,
            required: required_secs,
        }
        .into());
    }
    Ok(())
}

/// Fail with `DegenerateSignal` for NaN/infinite samples or a flat buffer
pub fn ensure_signal(buffer: &SampleBuffer) -> Result<()> {
    let samples = buffer.samples();
    if samples.iter().any(|s| !s.is_finite()) {
        return Err(TempoError::DegenerateSignal {
            reason: "buffer contains non-finite samples".to_string(),
        }
        .into());
    }

    let max = samples.iter().fold(f32::MIN, |acc, &x| acc.max(x));
    let min = samples.iter().fold(f32::MAX, |acc, &x| acc.min(x));
    if (max - min) < 1e-9 {
        return Err(TempoError::DegenerateSignal {
            reason: "buffer is silent or constant".to_string(),
        }
        .into());
    }

    Ok(())
}

/// Global tempo of an onset envelope
///
/// Scores each lag by the log of its normalized autocorrelation plus a
/// log-normal prior (one octave wide) centred on `prior_bpm`, then refines
/// the winning lag parabolically.
pub fn envelope_tempo(envelope: &OnsetEnvelope, prior_bpm: f64) -> Result<f64> {
    envelope.ensure_informative()?;

    let n = envelope.len();
    let fps = envelope.frame_rate;
    let max_lag = ((MAX_TEMPO_LAG_SECS * fps).round() as usize).min(n);
    let mut ac = dsp::autocorrelate(&envelope.values, max_lag)?;

    // Unbiased estimate, then relative to lag zero
    for (lag, value) in ac.iter_mut().enumerate() {
        *value /= (n - lag) as f64;
    }
    let energy = ac.first().copied().unwrap_or(0.0);
    if energy <= 0.0 || !energy.is_finite() {
        return Err(TempoError::DegenerateSignal {
            reason: "onset envelope has no energy".to_string(),
        }
        .into());
    }

    let min_lag = ((60.0 * fps / MAX_TEMPO_BPM).ceil() as usize).max(1);
    if min_lag + 1 >= ac.len() {
        return Err(TempoError::DegenerateSignal {
            reason: format!("onset envelope too short for tempo analysis ({} frames)", n),
        }
        .into());
    }

    let scores: Vec<f64> = ac
        .iter()
        .enumerate()
        .map(|(lag, &value)| {
            if lag < min_lag {
                return f64::NEG_INFINITY;
            }
            let bpm = 60.0 * fps / lag as f64;
            let strength = (1.0 + 1e6 * (value / energy).max(0.0)).ln();
            strength - 0.5 * (bpm / prior_bpm).log2().powi(2)
        })
        .collect();

    let best = (min_lag..scores.len())
        .max_by(|&a, &b| {
            scores[a]
                .partial_cmp(&scores[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(min_lag);

    let offset = if best > min_lag && best + 1 < scores.len() {
        dsp::parabolic_offset(scores[best - 1], scores[best], scores[best + 1])
    } else {
        0.0
    };

    Ok(60.0 * fps / (best as f64 + offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_octave_candidates() {
        assert_eq!(octave_candidates(124.0), [124.0, 62.0, 248.0]);
    }

    #[test]
    fn test_octave_correction_folds_to_anchor() {
        for bpm in [62.0, 124.0, 248.0] {
            assert_eq!(correct_octave(bpm, 125.0), 124.0, "from {}", bpm);
        }
        // Out of reach of a single octave step
        assert_eq!(correct_octave(31.0, 125.0), 62.0);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(
            "fusion".parse::<TempoEstimationStrategy>().unwrap(),
            TempoEstimationStrategy::Fusion
        );
        assert_eq!(
            "Constrained".parse::<TempoEstimationStrategy>().unwrap(),
            TempoEstimationStrategy::ConstrainedAutocorrelation
        );
        assert!("madmom".parse::<TempoEstimationStrategy>().is_err());
        assert_eq!(
            TempoEstimationStrategy::ConstrainedAutocorrelation.to_string(),
            "constrained_autocorrelation"
        );
    }

    #[test]
    fn test_strategy_builds_matching_estimator() {
        let config = Config::default();
        for strategy in [
            TempoEstimationStrategy::Fusion,
            TempoEstimationStrategy::ConstrainedAutocorrelation,
        ] {
            assert_eq!(strategy.estimator(&config).strategy(), strategy);
        }
    }

    #[test]
    fn test_envelope_tempo_of_pulse_train() {
        // Impulses every 43 frames at 86 fps -> 120 BPM
        let mut values = vec![0.0f32; 1200];
        for i in (10..1200).step_by(43) {
            values[i] = 1.0;
            values[i + 1] = 0.5;
        }
        let envelope = OnsetEnvelope {
            values,
            frame_rate: 86.0,
        };

        let bpm = envelope_tempo(&envelope, 120.0).unwrap();
        assert!((bpm - 120.0).abs() < 2.0, "bpm {}", bpm);
    }

    #[test]
    fn test_signal_checks() {
        let flat = SampleBuffer::new(vec![0.2; 100], 10).unwrap();
        assert!(matches!(
            ensure_signal(&flat),
            Err(BeatmixError::Tempo(TempoError::DegenerateSignal { .. }))
        ));

        let nan = SampleBuffer::new(vec![0.0, f32::NAN, 0.5], 10).unwrap();
        assert!(ensure_signal(&nan).is_err());

        let short = SampleBuffer::new(vec![0.1, -0.1], 1).unwrap();
        assert!(matches!(
            ensure_min_duration(&short, 5.0),
            Err(BeatmixError::Tempo(TempoError::InsufficientAudio { .. }))
        ));
    }
}
