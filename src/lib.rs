//! # beatmix
//!
//! Beat-synchronized DJ transitions between two recorded tracks.
//!
//! This library estimates the tempo of both tracks, time-stretches them to a
//! common tempo without changing pitch, lines up their first beats and
//! overlays the second track a few beats before the first one ends.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use beatmix::{config::Config, mix::MixPipeline};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let pipeline = MixPipeline::new(Config::default());
//! let outcome = pipeline
//!     .mix_files("song1.wav", "song2.wav", "mixed_song.wav")
//!     .await?;
//!
//! println!("Target tempo: {:.2} BPM", outcome.target_bpm);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//!
//! - [`audio`] - Sample buffers, file I/O, onset strength and DSP primitives
//! - [`tempo`] - Tempo estimation strategies and the beat tracker
//! - [`stretch`] - Phase vocoder time stretching
//! - [`mix`] - Beat alignment, crossfade composition and the pipeline
//! - [`config`] - Configuration management
//!
//! ## Custom Tempo Estimators
//!
//! The pipeline accepts any implementation of
//! [`TempoEstimator`](tempo::TempoEstimator):
//!
//! ```rust,no_run
//! use beatmix::audio::{SampleBuffer, TempoEstimate};
//! use beatmix::tempo::{TempoEstimationStrategy, TempoEstimator};
//! use beatmix::Result;
//!
//! struct MyEstimator;
//!
//! impl TempoEstimator for MyEstimator {
//!     fn name(&self) -> &str {
//!         "my_estimator"
//!     }
//!
//!     fn strategy(&self) -> TempoEstimationStrategy {
//!         TempoEstimationStrategy::Fusion
//!     }
//!
//!     fn estimate(&self, buffer: &SampleBuffer) -> Result<TempoEstimate> {
//!         // Your estimation here
//!         beatmix::tempo::estimate_tempo(buffer, 30.0, 126.0)
//!     }
//! }
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod mix;
pub mod stretch;
pub mod tempo;

// Re-export commonly used types for convenience
pub use crate::{
    audio::{BeatGrid, MixPlan, SampleBuffer, TempoEstimate},
    config::Config,
    error::{BeatmixError, Result},
    mix::{MixOutcome, MixPipeline},
    tempo::{TempoEstimationStrategy, TempoEstimator},
};
