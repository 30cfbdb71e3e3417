use crate::audio::dsp;
use crate::audio::types::{BeatGrid, MixPlan, SampleBuffer};
use crate::config::MixConfig;
use crate::error::{MixError, Result};

/// Mixed transition audio and the geometry that produced it
#[derive(Debug, Clone)]
pub struct Transition {
    pub plan: MixPlan,
    pub buffer: SampleBuffer,
}

/// Millisecond-addressed mono PCM, saturating on overlay
struct PcmTrack {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl PcmTrack {
    fn from_buffer(buffer: &SampleBuffer, sample_rate: u32) -> Result<Self> {
        let samples = dsp::resample(buffer.samples(), buffer.sample_rate(), sample_rate)?;
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    fn len_ms(&self) -> i64 {
        (self.samples.len() as f64 * 1000.0 / self.sample_rate as f64).round() as i64
    }

    fn sample_at(&self, ms: i64) -> usize {
        (ms.max(0) as f64 * self.sample_rate as f64 / 1000.0) as usize
    }

    /// Append silence until the track is at least `ms` long
    fn pad_to(&mut self, ms: i64) {
        let target = self.sample_at(ms);
        if self.samples.len() < target {
            self.samples.resize(target, 0.0);
        }
    }

    /// Sum `other` in starting at `position_ms`, never growing this track
    fn overlay(&mut self, other: &PcmTrack, position_ms: i64) {
        let start = self.sample_at(position_ms);
        for (slot, &sample) in self.samples.iter_mut().skip(start).zip(&other.samples) {
            *slot = (*slot + sample).clamp(-1.0, 1.0);
        }
    }

    fn slice(&self, start_ms: i64, end_ms: i64) -> Vec<f32> {
        let start = self.sample_at(start_ms).min(self.samples.len());
        let end = self.sample_at(end_ms).clamp(start, self.samples.len());
        self.samples[start..end].to_vec()
    }
}

/// Overlays song 2 onto the end of song 1 at a beat-relative point
#[derive(Debug, Clone, Default)]
pub struct CrossfadeCompositor {
    config: MixConfig,
}

impl CrossfadeCompositor {
    pub fn new(config: &MixConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Compute where song 2 enters and which window is extracted
    pub fn plan(&self, song1: &SampleBuffer, song2: &SampleBuffer, grid1: &BeatGrid) -> Result<MixPlan> {
        let config = &self.config;
        let beats_ms = grid1.times_ms();

        let avg_beat_ms = grid1
            .average_interval()
            .map(|secs| secs * 1000.0)
            .unwrap_or(config.fallback_beat_ms);

        let used_tail_fallback = beats_ms.len() <= config.beats_from_end;
        let overlay_start_ms = if used_tail_fallback {
            song1.duration_ms() - config.tail_fallback_ms
        } else {
            beats_ms[beats_ms.len() - config.beats_from_end] - avg_beat_ms / 2.0
        };

        let padded_ms = (overlay_start_ms + song2.duration_ms()).max(song1.duration_ms());
        if !overlay_start_ms.is_finite() || overlay_start_ms < 0.0 || overlay_start_ms > padded_ms {
            return Err(MixError::InvalidMixGeometry {
                overlay_start_ms,
                song_length_ms: song1.duration_ms(),
            }
            .into());
        }

        let window_start_ms = (overlay_start_ms - config.pre_roll_ms).trunc().max(0.0);
        let window_end_ms = (overlay_start_ms + config.post_roll_ms).trunc();

        Ok(MixPlan {
            overlay_start_ms,
            avg_beat_ms,
            used_tail_fallback,
            window_start_ms,
            window_end_ms,
        })
    }

    /// Overlay song 2 onto song 1 and extract the transition window
    ///
    /// The result is at song 1's sample rate; song 2 is resampled to match.
    pub fn compose(
        &self,
        song1: &SampleBuffer,
        song2: &SampleBuffer,
        grid1: &BeatGrid,
    ) -> Result<Transition> {
        let plan = self.plan(song1, song2, grid1)?;
        let rate = song1.sample_rate();

        let mut base = PcmTrack::from_buffer(song1, rate)?;
        let incoming = PcmTrack::from_buffer(song2, rate)?;

        let overlay_ms = plan.overlay_start_ms.trunc() as i64;
        base.pad_to((plan.overlay_start_ms + incoming.len_ms() as f64).trunc() as i64);
        base.overlay(&incoming, overlay_ms);

        if plan.used_tail_fallback {
            tracing::warn!(
                "Only {} beats tracked in song 1, starting overlay {:.0}ms before its end",
                grid1.len(),
                self.config.tail_fallback_ms
            );
        }
        tracing::info!("Starting overlay at {}", plan.overlay_start_display());
        tracing::info!("Average beat duration: {:.2}ms", plan.avg_beat_ms);
        tracing::info!("Half beat offset: {:.2}ms", plan.avg_beat_ms / 2.0);

        let samples = base.slice(plan.window_start_ms as i64, plan.window_end_ms as i64);
        let buffer = SampleBuffer::new(samples, rate)?;

        tracing::info!(
            "Extracted transition from {:.1}s to {:.1}s",
            plan.window_start_ms / 1000.0,
            plan.window_end_ms / 1000.0
        );

        Ok(Transition { plan, buffer })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BeatmixError;

    fn constant(value: f32, secs: f64, rate: u32) -> SampleBuffer {
        SampleBuffer::new(vec![value; (secs * rate as f64) as usize], rate).unwrap()
    }

    fn grid(start: f64, interval: f64, count: usize) -> BeatGrid {
        BeatGrid::new((0..count).map(|i| start + i as f64 * interval).collect())
    }

    #[test]
    fn test_overlay_eight_beats_before_end() {
        let song1 = constant(0.1, 30.0, 1000);
        let song2 = constant(0.2, 20.0, 1000);
        let beats = grid(1.0, 0.5, 50); // last beat at 25.5s

        let plan = CrossfadeCompositor::default().plan(&song1, &song2, &beats).unwrap();
        assert!(!plan.used_tail_fallback);
        assert!((plan.avg_beat_ms - 500.0).abs() < 1e-6);
        // beats[-8] = 22.0s, minus half a beat
        assert!((plan.overlay_start_ms - 21_750.0).abs() < 1e-6);
        assert_eq!(plan.window_start_ms, 16_750.0);
        assert_eq!(plan.window_end_ms, 31_750.0);
    }

    #[test]
    fn test_sparse_grid_uses_tail_fallback() {
        let song1 = constant(0.1, 30.0, 1000);
        let song2 = constant(0.2, 20.0, 1000);

        let plan = CrossfadeCompositor::default()
            .plan(&song1, &song2, &grid(1.0, 0.5, 3))
            .unwrap();
        assert!(plan.used_tail_fallback);
        assert_eq!(plan.overlay_start_ms, 26_000.0);
        assert_eq!(plan.avg_beat_ms, 500.0);

        let plan = CrossfadeCompositor::default()
            .plan(&song1, &song2, &BeatGrid::empty())
            .unwrap();
        assert_eq!(plan.avg_beat_ms, 500.0);
    }

    #[test]
    fn test_window_start_never_negative() {
        let song1 = constant(0.1, 6.0, 1000);
        let song2 = constant(0.2, 20.0, 1000);

        let transition = CrossfadeCompositor::default()
            .compose(&song1, &song2, &BeatGrid::empty())
            .unwrap();
        assert_eq!(transition.plan.overlay_start_ms, 2000.0);
        assert_eq!(transition.plan.window_start_ms, 0.0);
        // 2s before the overlay plus 10s after it
        assert_eq!(transition.buffer.len(), 12_000);
    }

    #[test]
    fn test_overlay_is_additive_and_saturates() {
        let song1 = constant(0.6, 30.0, 1000);
        let song2 = constant(0.3, 20.0, 1000);
        let beats = grid(1.0, 0.5, 50);

        let transition = CrossfadeCompositor::default().compose(&song1, &song2, &beats).unwrap();
        let samples = transition.buffer.samples();

        assert_eq!(samples.len(), 15_000);
        // Before the overlay only song 1 plays
        assert!((samples[100] - 0.6).abs() < 1e-6);
        // After it both play
        assert!((samples[6000] - 0.9).abs() < 1e-6);
        // Past the end of song 1 only song 2 remains
        assert!((samples[14_000] - 0.3).abs() < 1e-6);

        let loud = constant(0.8, 30.0, 1000);
        let clipped = CrossfadeCompositor::default().compose(&loud, &loud, &beats).unwrap();
        assert!(clipped.buffer.samples().iter().all(|&s| s <= 1.0));
        assert_eq!(clipped.buffer.samples()[6000], 1.0);
    }

    #[test]
    fn test_short_song_is_invalid_geometry() {
        let song1 = constant(0.1, 2.0, 1000);
        let song2 = constant(0.2, 20.0, 1000);
        let result = CrossfadeCompositor::default().compose(&song1, &song2, &BeatGrid::empty());
        assert!(matches!(
            result,
            Err(BeatmixError::Mix(MixError::InvalidMixGeometry { .. }))
        ));
    }

    #[test]
    fn test_song2_is_resampled_to_song1_rate() {
        let song1 = constant(0.1, 30.0, 8000);
        let song2 = constant(0.2, 20.0, 16000);

        let transition = CrossfadeCompositor::default()
            .compose(&song1, &song2, &grid(1.0, 0.5, 50))
            .unwrap();
        assert_eq!(transition.buffer.sample_rate(), 8000);
        assert_eq!(transition.buffer.len(), 15 * 8000);
    }
}
