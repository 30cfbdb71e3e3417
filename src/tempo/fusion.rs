use crate::audio::analyzer::{Aggregate, OnsetAnalyzer};
use crate::audio::types::{SampleBuffer, TempoCandidate, TempoEstimate, TempoMethod};
use crate::config::TempoConfig;
use crate::error::Result;
use crate::tempo::{
    ensure_min_duration, ensure_signal, envelope_tempo, BeatTracker, TempoEstimationStrategy,
    TempoEstimator,
};

/// Weighted blend of three tempo estimates taken from the start of a track
#[derive(Debug, Clone)]
pub struct FusionEstimator {
    config: TempoConfig,
}

impl FusionEstimator {
    pub fn new(analysis_window_secs: f64, anchor_bpm: f64) -> Self {
        Self {
            config: TempoConfig {
                analysis_window_secs,
                anchor_bpm,
                ..TempoConfig::default()
            },
        }
    }

    pub fn from_config(config: &TempoConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn tracker(&self, tightness: f64) -> BeatTracker {
        BeatTracker::new(self.config.anchor_bpm, tightness)
            .with_frames(self.config.n_fft, self.config.hop_length)
            .with_aggregate(Aggregate::Median)
    }

    /// Tracker behind the global-tempo candidate
    fn anchored_tracker(&self) -> BeatTracker {
        self.tracker(self.config.anchored_tightness)
    }

    /// Tighter tracker behind the beat-interval candidate
    fn interval_tracker(&self) -> BeatTracker {
        self.tracker(self.config.interval_tightness)
    }
}

/// Normalized weights `1 / (|bpm - anchor| + 1)`
pub fn fusion_weights(candidates: &[f64], anchor_bpm: f64) -> Vec<f64> {
    let raw: Vec<f64> = candidates
        .iter()
        .map(|&bpm| 1.0 / ((bpm - anchor_bpm).abs() + 1.0))
        .collect();
    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|w| w / total).collect()
}

impl TempoEstimator for FusionEstimator {
    fn name(&self) -> &str {
        "fusion"
    }

    fn strategy(&self) -> TempoEstimationStrategy {
        TempoEstimationStrategy::Fusion
    }

    fn estimate(&self, buffer: &SampleBuffer) -> Result<TempoEstimate> {
        let config = &self.config;
        ensure_min_duration(buffer, config.min_duration_secs)?;
        ensure_signal(buffer)?;

        let head = buffer.truncated(config.analysis_window_secs);
        let envelope = OnsetAnalyzer::new(config.n_fft, config.hop_length)
            .with_aggregate(Aggregate::Median)
            .envelope(&head)?;
        envelope.ensure_informative()?;

        let anchored = self.anchored_tracker().track_envelope(&envelope)?;
        let periodicity = envelope_tempo(&envelope, config.neutral_prior_bpm)?;
        let tight = self.interval_tracker().track_envelope(&envelope)?;
        let intervals = tight.grid.implied_bpm().unwrap_or(tight.bpm);

        let methods = [
            (TempoMethod::BeatTracker, anchored.bpm),
            (TempoMethod::OnsetEnvelope, periodicity),
            (TempoMethod::BeatIntervals, intervals),
        ];
        let bpms: Vec<f64> = methods.iter().map(|&(_, bpm)| bpm).collect();
        let weights = fusion_weights(&bpms, config.anchor_bpm);

        let candidates: Vec<TempoCandidate> = methods
            .iter()
            .zip(&weights)
            .map(|(&(method, bpm), &weight)| TempoCandidate {
                method,
                bpm,
                weight,
            })
            .collect();
        let bpm: f64 = candidates.iter().map(|c| c.bpm * c.weight).sum();

        tracing::info!(
            "Tempo candidates: {:.2}, {:.2}, {:.2} BPM",
            bpms[0],
            bpms[1],
            bpms[2]
        );
        tracing::info!(
            "Tempo weights: {:.3}, {:.3}, {:.3}",
            weights[0],
            weights[1],
            weights[2]
        );
        tracing::info!("Fused tempo: {:.2} BPM", bpm);

        Ok(TempoEstimate {
            bpm,
            candidates,
            beats: anchored.grid,
            strategy: TempoEstimationStrategy::Fusion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::synth::ClickTrack;
    use crate::error::{BeatmixError, TempoError};

    #[test]
    fn test_weights_favour_anchor() {
        let weights = fusion_weights(&[126.0, 125.0, 63.0], 126.0);
        assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(weights[0] > weights[1]);
        assert!(weights[1] > weights[2]);
        // 1 : 1/2 : 1/64
        assert!((weights[0] / weights[1] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_both_trackers_lean_on_anchor() {
        let estimator = FusionEstimator::new(30.0, 126.0);

        let anchored = estimator.anchored_tracker();
        assert_eq!(anchored.start_bpm(), 126.0);
        assert_eq!(anchored.tightness(), 400.0);

        let interval = estimator.interval_tracker();
        assert_eq!(interval.start_bpm(), 126.0);
        assert_eq!(interval.tightness(), 500.0);
    }

    #[test]
    fn test_fusion_on_128_bpm_click_track() {
        let buffer = ClickTrack::new(128.0, 32.0, 44100)
            .with_noise(0.01, 11)
            .render();
        let estimate = FusionEstimator::new(30.0, 126.0).estimate(&buffer).unwrap();

        assert!((estimate.bpm - 128.0).abs() <= 2.0, "bpm {}", estimate.bpm);
        assert_eq!(estimate.candidates.len(), 3);
        assert!(
            (estimate.candidates.iter().map(|c| c.weight).sum::<f64>() - 1.0).abs() < 1e-9
        );
        assert!(!estimate.beats.is_empty());
        assert!(estimate.is_plausible());
    }

    #[test]
    fn test_fusion_rejects_short_audio() {
        let buffer = ClickTrack::new(120.0, 4.0, 22050).render();
        let result = estimate_on(&buffer);
        assert!(matches!(
            result,
            Err(BeatmixError::Tempo(TempoError::InsufficientAudio { .. }))
        ));
    }

    #[test]
    fn test_fusion_rejects_silence() {
        let buffer = SampleBuffer::new(vec![0.0; 22050 * 6], 22050).unwrap();
        assert!(matches!(
            estimate_on(&buffer),
            Err(BeatmixError::Tempo(TempoError::DegenerateSignal { .. }))
        ));
    }

    fn estimate_on(buffer: &SampleBuffer) -> Result<TempoEstimate> {
        FusionEstimator::new(30.0, 126.0).estimate(buffer)
    }
}
