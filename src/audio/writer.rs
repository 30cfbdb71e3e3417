use std::path::Path;

use crate::audio::types::SampleBuffer;
use crate::error::{AudioError, Result};

/// Exports sample buffers to disk
pub struct AudioWriter;

impl AudioWriter {
    /// Write a mono 32-bit float WAV file
    pub fn save_wav<P: AsRef<Path>>(buffer: &SampleBuffer, path: P) -> Result<()> {
        let path = path.as_ref();
        let write_failed = |e: hound::Error| AudioError::WriteFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: buffer.sample_rate(),
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };

        let mut writer = hound::WavWriter::create(path, spec).map_err(write_failed)?;
        for &sample in buffer.samples() {
            writer.write_sample(sample).map_err(write_failed)?;
        }
        writer.finalize().map_err(write_failed)?;

        tracing::info!(
            "Wrote {:.2}s of audio at {} Hz to {}",
            buffer.duration_secs(),
            buffer.sample_rate(),
            path.display()
        );

        Ok(())
    }
}
