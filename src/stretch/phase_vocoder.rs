use std::f32::consts::PI;

use rustfft::num_complex::Complex;

/// Resample STFT frames in time by `rate` while keeping per-bin phase coherent
///
/// `rate > 1` produces fewer frames (faster playback). Magnitudes are
/// interpolated linearly between neighbouring frames; phases advance by the
/// bin's expected hop advance plus the measured deviation, wrapped to ±π.
pub fn phase_vocoder(
    frames: &[Vec<Complex<f32>>],
    rate: f64,
    hop: usize,
    n_fft: usize,
) -> Vec<Vec<Complex<f32>>> {
    let Some(first) = frames.first() else {
        return Vec::new();
    };
    let n_bins = first.len();

    let phi_advance: Vec<f32> = (0..n_bins)
        .map(|k| 2.0 * PI * hop as f32 * k as f32 / n_fft as f32)
        .collect();
    let mut phase_acc: Vec<f32> = first.iter().map(|c| c.arg()).collect();

    let silent = vec![Complex::new(0.0f32, 0.0); n_bins];
    let frame_at = |idx: usize| frames.get(idx).unwrap_or(&silent);

    let steps = (frames.len() as f64 / rate).ceil() as usize;
    let mut output = Vec::with_capacity(steps);

    for t in 0..steps {
        let step = t as f64 * rate;
        let base = step.floor() as usize;
        let alpha = (step - base as f64) as f32;
        let (left, right) = (frame_at(base), frame_at(base + 1));

        let mut frame = Vec::with_capacity(n_bins);
        for k in 0..n_bins {
            let magnitude = (1.0 - alpha) * left[k].norm() + alpha * right[k].norm();
            frame.push(Complex::from_polar(magnitude, phase_acc[k]));

            let mut dphase = right[k].arg() - left[k].arg() - phi_advance[k];
            dphase -= 2.0 * PI * (dphase / (2.0 * PI)).round();
            // Kept wrapped so f32 precision does not degrade on long tracks
            phase_acc[k] = (phase_acc[k] + phi_advance[k] + dphase).rem_euclid(2.0 * PI);
        }
        output.push(frame);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_count_follows_rate() {
        let frames = vec![vec![Complex::new(1.0f32, 0.0); 5]; 10];
        assert_eq!(phase_vocoder(&frames, 2.0, 4, 8).len(), 5);
        assert_eq!(phase_vocoder(&frames, 0.5, 4, 8).len(), 20);
        assert_eq!(phase_vocoder(&frames, 1.0, 4, 8).len(), 10);
        assert!(phase_vocoder(&[], 1.0, 4, 8).is_empty());
    }

    #[test]
    fn test_magnitudes_are_interpolated() {
        let frames = vec![
            vec![Complex::new(1.0f32, 0.0); 3],
            vec![Complex::new(3.0f32, 0.0); 3],
        ];
        let out = phase_vocoder(&frames, 0.5, 4, 8);
        assert!((out[1][0].norm() - 2.0).abs() < 1e-6);
    }
}
