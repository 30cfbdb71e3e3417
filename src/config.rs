use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ConfigError, Result};
use crate::tempo::TempoEstimationStrategy;

/// Main configuration for beatmix
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fusion tempo estimation settings
    pub tempo: TempoConfig,

    /// Constrained autocorrelation tempo estimation settings
    pub constrained: ConstrainedConfig,

    /// Phase vocoder settings
    pub stretch: StretchConfig,

    /// Alignment and crossfade geometry
    pub mix: MixConfig,

    /// Orchestration settings
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|_| ConfigError::ParseFailed {
            path: path.display().to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidValue {
            key: "config".to_string(),
            value: e.to_string(),
        })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.tempo.validate()?;
        self.constrained.validate()?;
        self.stretch.validate()?;
        self.mix.validate()?;
        self.pipeline.validate()?;
        Ok(())
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn check_positive(key: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(key, value).into());
    }
    Ok(())
}

fn check_fft(key: &str, n_fft: usize, hop_length: usize) -> Result<()> {
    if n_fft < 16 || !n_fft.is_power_of_two() {
        return Err(invalid(&format!("{}.n_fft", key), n_fft).into());
    }
    if hop_length == 0 || hop_length > n_fft {
        return Err(invalid(&format!("{}.hop_length", key), hop_length).into());
    }
    Ok(())
}

/// Fusion tempo estimation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    /// Strategy used by the pipeline
    pub strategy: TempoEstimationStrategy,

    /// Only this much of the start of a track is analyzed (seconds)
    pub analysis_window_secs: f64,

    /// Shortest track either strategy accepts (seconds)
    pub min_duration_secs: f64,

    /// Tempo the fusion weights favour
    pub anchor_bpm: f64,

    /// Prior of the onset-envelope candidate
    pub neutral_prior_bpm: f64,

    pub n_fft: usize,
    pub hop_length: usize,

    /// Beat tracker tightness for the anchored candidate
    pub anchored_tightness: f64,

    /// Beat tracker tightness for the beat-interval candidate
    pub interval_tightness: f64,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            strategy: TempoEstimationStrategy::Fusion,
            analysis_window_secs: 30.0,
            min_duration_secs: 5.0,
            anchor_bpm: 126.0,
            neutral_prior_bpm: 120.0,
            n_fft: 2048,
            hop_length: 512,
            anchored_tightness: 400.0,
            interval_tightness: 500.0,
        }
    }
}

impl TempoConfig {
    fn validate(&self) -> Result<()> {
        check_positive("tempo.analysis_window_secs", self.analysis_window_secs)?;
        check_positive("tempo.min_duration_secs", self.min_duration_secs)?;
        check_positive("tempo.anchor_bpm", self.anchor_bpm)?;
        check_positive("tempo.neutral_prior_bpm", self.neutral_prior_bpm)?;
        check_positive("tempo.anchored_tightness", self.anchored_tightness)?;
        check_positive("tempo.interval_tightness", self.interval_tightness)?;
        check_fft("tempo", self.n_fft, self.hop_length)?;

        if self.analysis_window_secs < self.min_duration_secs {
            return Err(invalid(
                "tempo.analysis_window_secs",
                format!("{} < min_duration_secs", self.analysis_window_secs),
            )
            .into());
        }

        Ok(())
    }
}

/// Constrained autocorrelation tempo estimation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstrainedConfig {
    /// Slowest tempo searched
    pub bpm_min: f64,

    /// Fastest tempo searched
    pub bpm_max: f64,

    /// Octave correction picks the multiple closest to this
    pub anchor_bpm: f64,

    pub preemphasis: f32,
    pub n_fft: usize,

    /// Hop at the downsampled rate
    pub hop_length: usize,

    pub savgol_window: usize,
    pub savgol_polyorder: usize,
    pub median_kernel: usize,

    /// Peaks below this fraction of the tallest lag are ignored
    pub peak_threshold: f64,

    /// Log a prior-driven tempo alongside the result at debug level
    pub sanity_check: bool,
}

impl Default for ConstrainedConfig {
    fn default() -> Self {
        Self {
            bpm_min: 115.0,
            bpm_max: 130.0,
            anchor_bpm: 125.0,
            preemphasis: 0.97,
            n_fft: 2048,
            hop_length: 64,
            savgol_window: 51,
            savgol_polyorder: 3,
            median_kernel: 7,
            peak_threshold: 0.8,
            sanity_check: true,
        }
    }
}

impl ConstrainedConfig {
    fn validate(&self) -> Result<()> {
        check_positive("constrained.bpm_min", self.bpm_min)?;
        check_positive("constrained.bpm_max", self.bpm_max)?;
        check_positive("constrained.anchor_bpm", self.anchor_bpm)?;
        check_fft("constrained", self.n_fft, self.hop_length)?;

        if self.bpm_min >= self.bpm_max {
            return Err(invalid(
                "constrained.bpm_range",
                format!("{}-{}", self.bpm_min, self.bpm_max),
            )
            .into());
        }

        if !(0.0..1.0).contains(&self.preemphasis) {
            return Err(invalid("constrained.preemphasis", self.preemphasis).into());
        }

        if self.savgol_window <= self.savgol_polyorder {
            return Err(invalid("constrained.savgol_window", self.savgol_window).into());
        }

        if self.median_kernel == 0 {
            return Err(invalid("constrained.median_kernel", self.median_kernel).into());
        }

        if !(self.peak_threshold > 0.0 && self.peak_threshold <= 1.0) {
            return Err(invalid("constrained.peak_threshold", self.peak_threshold).into());
        }

        Ok(())
    }
}

/// Phase vocoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StretchConfig {
    pub n_fft: usize,
    pub hop_length: usize,
}

impl Default for StretchConfig {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
        }
    }
}

impl StretchConfig {
    fn validate(&self) -> Result<()> {
        check_fft("stretch", self.n_fft, self.hop_length)
    }
}

/// Alignment and crossfade configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixConfig {
    /// Song 2 enters this many beats before the last tracked beat of song 1
    pub beats_from_end: usize,

    /// Beat duration assumed when fewer than two beats were tracked (ms)
    pub fallback_beat_ms: f64,

    /// Overlay offset from the end of song 1 for sparse grids (ms)
    pub tail_fallback_ms: f64,

    /// Audio kept before the overlay start (ms)
    pub pre_roll_ms: f64,

    /// Audio kept after the overlay start (ms)
    pub post_roll_ms: f64,

    /// Fraction of each stretched track used to find the first beat
    pub alignment_fraction: f64,

    /// Tempo prior of the beat tracker used for grids
    pub grid_prior_bpm: f64,

    /// Tightness of the beat tracker used for grids
    pub grid_tightness: f64,
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            beats_from_end: 8,
            fallback_beat_ms: 500.0,
            tail_fallback_ms: 4000.0,
            pre_roll_ms: 5000.0,
            post_roll_ms: 10000.0,
            alignment_fraction: 0.5,
            grid_prior_bpm: 120.0,
            grid_tightness: 100.0,
        }
    }
}

impl MixConfig {
    fn validate(&self) -> Result<()> {
        if self.beats_from_end == 0 {
            return Err(invalid("mix.beats_from_end", self.beats_from_end).into());
        }
        check_positive("mix.fallback_beat_ms", self.fallback_beat_ms)?;
        check_positive("mix.tail_fallback_ms", self.tail_fallback_ms)?;
        check_positive("mix.post_roll_ms", self.post_roll_ms)?;
        check_positive("mix.grid_prior_bpm", self.grid_prior_bpm)?;
        check_positive("mix.grid_tightness", self.grid_tightness)?;

        if !self.pre_roll_ms.is_finite() || self.pre_roll_ms < 0.0 {
            return Err(invalid("mix.pre_roll_ms", self.pre_roll_ms).into());
        }

        if !(self.alignment_fraction > 0.0 && self.alignment_fraction <= 1.0) {
            return Err(invalid("mix.alignment_fraction", self.alignment_fraction).into());
        }

        Ok(())
    }
}

/// Orchestration configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on a whole mix run (seconds)
    pub timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { timeout_secs: 600 }
    }
}

impl PipelineConfig {
    fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(invalid("pipeline.timeout_secs", self.timeout_secs).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test_config.toml");

        let mut original_config = Config::default();
        original_config.tempo.strategy = TempoEstimationStrategy::ConstrainedAutocorrelation;
        original_config.mix.beats_from_end = 16;

        original_config.save_to_file(&file_path).unwrap();
        let loaded_config = Config::from_file(&file_path).unwrap();

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("partial.toml");
        std::fs::write(&file_path, "[constrained]\nbpm_min = 100.0\n").unwrap();

        let config = Config::from_file(&file_path).unwrap();
        assert_eq!(config.constrained.bpm_min, 100.0);
        assert_eq!(config.constrained.bpm_max, 130.0);
        assert_eq!(config.tempo.anchor_bpm, 126.0);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file("/nonexistent/beatmix.toml");
        assert!(matches!(
            result,
            Err(crate::error::BeatmixError::Config(ConfigError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_invalid_bpm_range() {
        let mut config = Config::default();
        config.constrained.bpm_min = 150.0;
        config.constrained.bpm_max = 100.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_fft_size() {
        let mut config = Config::default();
        config.stretch.n_fft = 1000;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.tempo.hop_length = 0;
        assert!(config.validate().is_err());
    }
}
