//! # Audio Module
//!
//! Sample buffers, file I/O and the signal-processing primitives the tempo,
//! stretch and mix stages are built on.
//!
//! ## Core Features
//!
//! - **Loading**: WAV through hound, compressed formats through Symphonia,
//!   always mixed down to mono
//! - **Onset strength**: mel-spectrogram spectral flux with mean or median
//!   band aggregation
//! - **DSP primitives**: STFT/ISTFT, FFT autocorrelation, band-limited
//!   resampling, Savitzky-Golay smoothing, peak picking
//! - **Export**: 32-bit float WAV
//!
//! ## Usage
//!
//! ```rust,no_run
//! use beatmix::audio::{AudioLoader, OnsetAnalyzer};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let buffer = AudioLoader::load("song.wav").await?;
//! let envelope = OnsetAnalyzer::new(2048, 512).envelope(&buffer)?;
//!
//! println!("{} onset frames at {:.1} fps", envelope.len(), envelope.frame_rate);
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod dsp;
pub mod loader;
pub mod synth;
pub mod types;
pub mod writer;

pub use analyzer::{Aggregate, OnsetAnalyzer, OnsetEnvelope};
pub use loader::AudioLoader;
pub use synth::ClickTrack;
pub use types::{BeatGrid, MixPlan, SampleBuffer, TempoCandidate, TempoEstimate, TempoMethod};
pub use writer::AudioWriter;
