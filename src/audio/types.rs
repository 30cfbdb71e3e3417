use serde::{Deserialize, Serialize};

use crate::error::{AudioError, Result};
use crate::tempo::TempoEstimationStrategy;

/// Decoded mono audio with its sample rate
///
/// A buffer is never empty and always has a positive sample rate. Stages
/// that change the audio (stretching, alignment, overlay) produce a new
/// buffer rather than mutating this one.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Create a buffer from mono samples
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if samples.is_empty() {
            return Err(AudioError::EmptyBuffer.into());
        }
        if sample_rate == 0 {
            return Err(AudioError::InvalidParameters {
                details: "sample rate must be positive".to_string(),
            }
            .into());
        }

        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Internal constructor for callers that already guarantee a non-empty buffer
    pub(crate) fn from_valid(samples: Vec<f32>, sample_rate: u32) -> Self {
        debug_assert!(!samples.is_empty() && sample_rate > 0);
        Self {
            samples,
            sample_rate,
        }
    }

    /// Create a buffer from interleaved samples, averaging all channels to mono
    pub fn from_interleaved(samples: &[f32], sample_rate: u32, channels: u16) -> Result<Self> {
        if channels == 0 {
            return Err(AudioError::InvalidParameters {
                details: "channel count must be positive".to_string(),
            }
            .into());
        }

        if channels == 1 {
            return Self::new(samples.to_vec(), sample_rate);
        }

        let mono = samples
            .chunks_exact(channels as usize)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();

        Self::new(mono, sample_rate)
    }

    /// Build a buffer at the same sample rate with different samples
    pub fn with_samples(&self, samples: Vec<f32>) -> Result<Self> {
        Self::new(samples, self.sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Duration in milliseconds
    pub fn duration_ms(&self) -> f64 {
        self.duration_secs() * 1000.0
    }

    /// Number of samples covering `seconds` of audio at this rate (truncating)
    pub fn samples_for_secs(&self, seconds: f64) -> usize {
        (seconds.max(0.0) * self.sample_rate as f64) as usize
    }

    /// Copy of the first `seconds` of audio (at least one sample)
    pub fn truncated(&self, seconds: f64) -> SampleBuffer {
        let keep = self.samples_for_secs(seconds).clamp(1, self.samples.len());
        Self {
            samples: self.samples[..keep].to_vec(),
            sample_rate: self.sample_rate,
        }
    }

    /// Largest absolute sample value
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()))
    }
}

/// Ordered beat onset times in seconds
///
/// Times are strictly increasing. An empty grid means the track was judged
/// arrhythmic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<f64>", into = "Vec<f64>")]
pub struct BeatGrid {
    times: Vec<f64>,
}

impl From<Vec<f64>> for BeatGrid {
    fn from(times: Vec<f64>) -> Self {
        Self::new(times)
    }
}

impl From<BeatGrid> for Vec<f64> {
    fn from(grid: BeatGrid) -> Self {
        grid.times
    }
}

impl BeatGrid {
    /// Build a grid, dropping non-finite times and anything not strictly after its predecessor
    pub fn new(times: Vec<f64>) -> Self {
        let mut ordered: Vec<f64> = Vec::with_capacity(times.len());
        for time in times.into_iter().filter(|t| t.is_finite()) {
            if ordered.last().map_or(true, |&last| time > last) {
                ordered.push(time);
            }
        }
        Self { times: ordered }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn first(&self) -> Option<f64> {
        self.times.first().copied()
    }

    /// First beat time, or 0 for an arrhythmic track
    pub fn first_or_zero(&self) -> f64 {
        self.first().unwrap_or(0.0)
    }

    /// Beat times in milliseconds
    pub fn times_ms(&self) -> Vec<f64> {
        self.times.iter().map(|t| t * 1000.0).collect()
    }

    /// Mean of consecutive beat differences in seconds
    pub fn average_interval(&self) -> Option<f64> {
        if self.times.len() < 2 {
            return None;
        }
        let span = self.times[self.times.len() - 1] - self.times[0];
        Some(span / (self.times.len() - 1) as f64)
    }

    /// Tempo implied by the average beat interval
    pub fn implied_bpm(&self) -> Option<f64> {
        self.average_interval()
            .filter(|&interval| interval > 0.0)
            .map(|interval| 60.0 / interval)
    }
}

/// Signal path that produced a tempo candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempoMethod {
    /// Global tempo of the anchored dynamic-programming beat tracker
    BeatTracker,

    /// Periodicity of the median-aggregated onset envelope
    OnsetEnvelope,

    /// Mean inter-beat interval of a tighter tracker run
    BeatIntervals,

    /// Band-limited autocorrelation peak picking
    ConstrainedAutocorrelation,
}

/// One method's tempo and its normalized share of the final estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoCandidate {
    pub method: TempoMethod,
    pub bpm: f64,
    pub weight: f64,
}

/// A track's estimated tempo
#[derive(Debug, Clone, PartialEq)]
pub struct TempoEstimate {
    /// Final beats-per-minute value
    pub bpm: f64,

    /// Per-method sub-estimates with their fusion weights
    pub candidates: Vec<TempoCandidate>,

    /// Beats found while estimating (empty when the strategy does not track beats)
    pub beats: BeatGrid,

    /// Strategy that produced this estimate
    pub strategy: TempoEstimationStrategy,
}

impl TempoEstimate {
    pub const PLAUSIBLE_MIN_BPM: f64 = 40.0;
    pub const PLAUSIBLE_MAX_BPM: f64 = 220.0;

    /// Whether the estimate falls inside the range real music occupies
    ///
    /// Values outside are usually octave errors; callers should flag them
    /// rather than silently accept them.
    pub fn is_plausible(&self) -> bool {
        self.bpm.is_finite()
            && (Self::PLAUSIBLE_MIN_BPM..=Self::PLAUSIBLE_MAX_BPM).contains(&self.bpm)
    }
}

/// Crossfade geometry computed from song 1's beat grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MixPlan {
    /// Where song 2 starts inside song 1 (ms)
    pub overlay_start_ms: f64,

    /// Average beat duration of song 1 (ms)
    pub avg_beat_ms: f64,

    /// True when the grid was too sparse and the fixed tail offset was used
    pub used_tail_fallback: bool,

    /// Start of the extracted transition window (ms, never negative)
    pub window_start_ms: f64,

    /// End of the extracted transition window (ms, exclusive)
    pub window_end_ms: f64,
}

impl MixPlan {
    pub fn window_len_ms(&self) -> f64 {
        (self.window_end_ms - self.window_start_ms).max(0.0)
    }

    /// Overlay start formatted as `m:ss`
    pub fn overlay_start_display(&self) -> String {
        let seconds = self.overlay_start_ms / 1000.0;
        let minutes = (seconds / 60.0).floor() as u64;
        let remainder = (seconds % 60.0).floor() as u64;
        format!("{}:{:02}", minutes, remainder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_buffer_mono_conversion() {
        let stereo_samples = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]; // L, R, L, R, L, R
        let buffer = SampleBuffer::from_interleaved(&stereo_samples, 44100, 2).unwrap();
        assert_eq!(buffer.samples(), &[1.5, 3.5, 5.5]);
        assert_eq!(buffer.sample_rate(), 44100);
    }

    #[test]
    fn test_sample_buffer_rejects_invalid_input() {
        assert!(SampleBuffer::new(vec![], 44100).is_err());
        assert!(SampleBuffer::new(vec![0.0; 10], 0).is_err());
        assert!(SampleBuffer::from_interleaved(&[0.0; 4], 44100, 0).is_err());
    }

    #[test]
    fn test_truncation_and_duration() {
        let buffer = SampleBuffer::new(vec![0.1; 1000], 100).unwrap();
        assert_eq!(buffer.duration_secs(), 10.0);
        assert_eq!(buffer.duration_ms(), 10000.0);

        let head = buffer.truncated(2.5);
        assert_eq!(head.len(), 250);

        let whole = buffer.truncated(60.0);
        assert_eq!(whole.len(), 1000);

        let tiny = buffer.truncated(0.0);
        assert_eq!(tiny.len(), 1);
    }

    #[test]
    fn test_beat_grid_enforces_strict_order() {
        let grid = BeatGrid::new(vec![0.5, 1.0, 1.0, 0.9, f64::NAN, 1.5]);
        assert_eq!(grid.times(), &[0.5, 1.0, 1.5]);
        assert_eq!(grid.first_or_zero(), 0.5);
        assert_eq!(grid.average_interval(), Some(0.5));
        assert_eq!(grid.implied_bpm(), Some(120.0));
    }

    #[test]
    fn test_deserialized_grid_is_ordered() {
        #[derive(Deserialize, Serialize)]
        struct Saved {
            beats: BeatGrid,
        }

        let saved: Saved = toml::from_str("beats = [0.5, 1.0, 0.9, 1.5]").unwrap();
        assert_eq!(saved.beats.times(), &[0.5, 1.0, 1.5]);

        let text = toml::to_string(&saved).unwrap();
        let reloaded: Saved = toml::from_str(&text).unwrap();
        assert_eq!(reloaded.beats, saved.beats);
    }

    #[test]
    fn test_empty_grid_defaults() {
        let grid = BeatGrid::empty();
        assert_eq!(grid.first_or_zero(), 0.0);
        assert!(grid.average_interval().is_none());
    }

    #[test]
    fn test_plausibility_bounds() {
        let mut estimate = TempoEstimate {
            bpm: 124.0,
            candidates: vec![],
            beats: BeatGrid::empty(),
            strategy: TempoEstimationStrategy::Fusion,
        };
        assert!(estimate.is_plausible());

        estimate.bpm = 248.0;
        assert!(!estimate.is_plausible());

        estimate.bpm = 31.0;
        assert!(!estimate.is_plausible());
    }

    #[test]
    fn test_overlay_start_display() {
        let plan = MixPlan {
            overlay_start_ms: 125_400.0,
            avg_beat_ms: 500.0,
            used_tail_fallback: false,
            window_start_ms: 120_400.0,
            window_end_ms: 135_400.0,
        };
        assert_eq!(plan.overlay_start_display(), "2:05");
        assert_eq!(plan.window_len_ms(), 15_000.0);
    }
}
