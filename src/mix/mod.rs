//! # Mix Module
//!
//! Turns two tempo-matched tracks into a beat-synchronized transition and
//! orchestrates the full estimate, stretch, align and crossfade run.

pub mod aligner;
pub mod compositor;
pub mod pipeline;

pub use aligner::{AlignedPair, BeatAligner};
pub use compositor::{CrossfadeCompositor, Transition};
pub use pipeline::{MixOutcome, MixPipeline};
