//! Synthetic kick-drum click tracks for demos and tests.

use std::f32::consts::PI;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::audio::types::SampleBuffer;

/// Builder for a metronomic kick pattern
#[derive(Debug, Clone)]
pub struct ClickTrack {
    bpm: f64,
    duration_secs: f64,
    sample_rate: u32,
    offset_secs: f64,
    noise_level: f32,
    seed: u64,
}

impl ClickTrack {
    pub fn new(bpm: f64, duration_secs: f64, sample_rate: u32) -> Self {
        Self {
            bpm,
            duration_secs,
            sample_rate,
            offset_secs: 0.0,
            noise_level: 0.0,
            seed: 7,
        }
    }

    /// Delay before the first kick
    pub fn with_offset(mut self, offset_secs: f64) -> Self {
        self.offset_secs = offset_secs.max(0.0);
        self
    }

    /// Add uniform background noise of the given amplitude
    pub fn with_noise(mut self, level: f32, seed: u64) -> Self {
        self.noise_level = level.max(0.0);
        self.seed = seed;
        self
    }

    /// Kick onset times in seconds
    pub fn beat_times(&self) -> Vec<f64> {
        let interval = 60.0 / self.bpm;
        let mut times = Vec::new();
        let mut t = self.offset_secs;
        while t < self.duration_secs {
            times.push(t);
            t += interval;
        }
        times
    }

    pub fn render(&self) -> SampleBuffer {
        let rate = self.sample_rate.max(1);
        let total = ((self.duration_secs * rate as f64) as usize).max(1);
        let mut samples = vec![0.0f32; total];

        let kick = Self::kick(rate);
        for time in self.beat_times() {
            let start = (time * rate as f64).round() as usize;
            for (slot, &k) in samples.iter_mut().skip(start).zip(&kick) {
                *slot += k;
            }
        }

        if self.noise_level > 0.0 {
            let mut rng = SmallRng::seed_from_u64(self.seed);
            for sample in samples.iter_mut() {
                *sample += rng.gen_range(-self.noise_level..=self.noise_level);
            }
        }

        for sample in samples.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }

        SampleBuffer::from_valid(samples, rate)
    }

    /// 150 ms kick: pitch sweep 150 -> 50 Hz with exponential decay, plus a short click
    fn kick(sample_rate: u32) -> Vec<f32> {
        let len = (0.15 * sample_rate as f32) as usize;
        let mut phase = 0.0f32;
        (0..len)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                let freq = 50.0 + 100.0 * (-t * 30.0).exp();
                phase += 2.0 * PI * freq / sample_rate as f32;
                let body = phase.sin() * (-t * 25.0).exp() * 0.8;
                let click = if t < 0.003 { (1.0 - t / 0.003) * 0.4 } else { 0.0 };
                body + click
            })
            .collect()
    }
}
