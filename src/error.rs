use thiserror::Error;

/// Main error type for the beatmix library
#[derive(Error, Debug)]
pub enum BeatmixError {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Tempo estimation error: {0}")]
    Tempo(#[from] TempoError),

    #[error("Time stretch error: {0}")]
    Stretch(#[from] StretchError),

    #[error("Mixing error: {0}")]
    Mix(#[from] MixError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Audio buffer, decoding and export errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to load audio file: {path}")]
    LoadFailed { path: String },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Failed to write audio file: {path} - {reason}")]
    WriteFailed { path: String, reason: String },

    #[error("Sample buffer is empty")]
    EmptyBuffer,

    #[error("Spectral analysis failed: {reason}")]
    AnalysisFailed { reason: String },

    #[error("Resampling failed: {reason}")]
    ResampleFailed { reason: String },

    #[error("Invalid audio parameters: {details}")]
    InvalidParameters { details: String },
}

/// Tempo estimation errors
#[derive(Error, Debug)]
pub enum TempoError {
    #[error("Insufficient audio: {duration:.2}s available, at least {required:.2}s required")]
    InsufficientAudio { duration: f64, required: f64 },

    #[error("Degenerate signal: {reason}")]
    DegenerateSignal { reason: String },

    #[error("Lag range {lag_min}..{lag_max} does not fit an autocorrelation of length {available}")]
    RangeExceeded {
        lag_min: usize,
        lag_max: usize,
        available: usize,
    },

    #[error("No dominant periodicity between {bpm_min} and {bpm_max} BPM")]
    NoDominantPeak { bpm_min: f64, bpm_max: f64 },
}

/// Time stretch errors
#[derive(Error, Debug)]
pub enum StretchError {
    #[error("Invalid stretch ratio: {current_bpm} BPM -> {target_bpm} BPM")]
    InvalidStretchRatio { current_bpm: f64, target_bpm: f64 },
}

/// Mix composition and pipeline errors
#[derive(Error, Debug)]
pub enum MixError {
    #[error("Invalid mix geometry: overlay at {overlay_start_ms:.1}ms, song length {song_length_ms:.1}ms")]
    InvalidMixGeometry {
        overlay_start_ms: f64,
        song_length_ms: f64,
    },

    #[error("Pipeline did not finish within {secs}s")]
    PipelineTimeout { secs: u64 },

    #[error("Pipeline task failed: {reason}")]
    TaskFailed { reason: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using BeatmixError
pub type Result<T> = std::result::Result<T, BeatmixError>;

impl BeatmixError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Check if this error is recoverable (can be retried)
    ///
    /// Analysis inputs are deterministic, so only I/O failures qualify.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::Audio(AudioError::LoadFailed { .. }) => true,
            Self::Audio(AudioError::WriteFailed { .. }) => true,
            _ => false,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Audio(AudioError::LoadFailed { path }) => {
                format!("Could not load audio file '{}'. Please check the file exists and is a supported format.", path)
            }
            Self::Tempo(TempoError::InsufficientAudio { duration, required }) => {
                format!("Track is too short for tempo analysis ({:.1}s, need at least {:.1}s).", duration, required)
            }
            Self::Tempo(TempoError::NoDominantPeak { .. }) => {
                "No clear beat found in the expected tempo range. Try a louder or more rhythmic track, or the fusion strategy.".to_string()
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_errors_are_not_recoverable() {
        let err: BeatmixError = TempoError::DegenerateSignal {
            reason: "flat".to_string(),
        }
        .into();
        assert!(!err.is_recoverable());

        let err: BeatmixError = AudioError::LoadFailed {
            path: "a.wav".to_string(),
        }
        .into();
        assert!(err.is_recoverable());

        let err: BeatmixError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked").into();
        assert!(err.is_recoverable());

        let err: BeatmixError = MixError::PipelineTimeout { secs: 600 }.into();
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_user_message_for_short_track() {
        let err: BeatmixError = TempoError::InsufficientAudio {
            duration: 2.0,
            required: 5.0,
        }
        .into();
        assert!(err.user_message().contains("too short"));
    }
}
