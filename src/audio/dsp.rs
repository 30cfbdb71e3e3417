//! Signal-processing building blocks shared by the analysis and stretch stages.

use std::f32::consts::PI;
use std::sync::Arc;

use rayon::prelude::*;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use rustfft::num_complex::Complex;

use crate::error::{AudioError, Result};

/// Periodic Hann window
pub fn hann_window(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / len as f32).cos())
        .collect()
}

/// Short-time Fourier transform with centered, zero-padded frames
pub struct Stft {
    n_fft: usize,
    hop: usize,
    window: Vec<f32>,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
}

impl Stft {
    pub fn new(n_fft: usize, hop: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        Self {
            n_fft,
            hop,
            window: hann_window(n_fft),
            forward: planner.plan_fft_forward(n_fft),
            inverse: planner.plan_fft_inverse(n_fft),
        }
    }

    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Number of frames produced for a signal of `len` samples
    pub fn frame_count(&self, len: usize) -> usize {
        1 + len / self.hop
    }

    /// Complex spectrum of every frame
    pub fn forward(&self, samples: &[f32]) -> Result<Vec<Vec<Complex<f32>>>> {
        let pad = self.n_fft / 2;
        let mut padded = vec![0.0f32; samples.len() + self.n_fft];
        padded[pad..pad + samples.len()].copy_from_slice(samples);

        (0..self.frame_count(samples.len()))
            .into_par_iter()
            .map(|frame_idx| {
                let start = frame_idx * self.hop;
                let mut input: Vec<f32> = padded[start..start + self.n_fft]
                    .iter()
                    .zip(&self.window)
                    .map(|(&sample, &w)| sample * w)
                    .collect();
                let mut spectrum = self.forward.make_output_vec();

                self.forward
                    .process(&mut input, &mut spectrum)
                    .map_err(|e| AudioError::AnalysisFailed {
                        reason: format!("forward FFT failed: {}", e),
                    })?;

                Ok(spectrum)
            })
            .collect()
    }

    /// Power spectrum of every frame
    pub fn power(&self, samples: &[f32]) -> Result<Vec<Vec<f32>>> {
        Ok(self
            .forward(samples)?
            .into_iter()
            .map(|frame| frame.iter().map(|c| c.norm_sqr()).collect())
            .collect())
    }

    /// Overlap-add resynthesis trimmed or zero-padded to exactly `length` samples
    pub fn inverse(&self, frames: &[Vec<Complex<f32>>], length: usize) -> Result<Vec<f32>> {
        let full_len = self.n_fft + self.hop * frames.len().saturating_sub(1);
        let mut output = vec![0.0f32; full_len];
        let mut window_sum = vec![0.0f32; full_len];
        let mut time_frame = self.inverse.make_output_vec();
        let scale = 1.0 / self.n_fft as f32;

        for (frame_idx, frame) in frames.iter().enumerate() {
            let mut spectrum = frame.clone();
            // DC and Nyquist bins of a real signal carry no imaginary part
            if let Some(first) = spectrum.first_mut() {
                first.im = 0.0;
            }
            if let Some(last) = spectrum.last_mut() {
                last.im = 0.0;
            }

            self.inverse
                .process(&mut spectrum, &mut time_frame)
                .map_err(|e| AudioError::AnalysisFailed {
                    reason: format!("inverse FFT failed: {}", e),
                })?;

            let start = frame_idx * self.hop;
            for (i, (&sample, &w)) in time_frame.iter().zip(&self.window).enumerate() {
                output[start + i] += sample * scale * w;
                window_sum[start + i] += w * w;
            }
        }

        for (sample, &norm) in output.iter_mut().zip(&window_sum) {
            if norm > 1e-8 {
                *sample /= norm;
            }
        }

        let mut signal: Vec<f32> = output
            .into_iter()
            .skip(self.n_fft / 2)
            .take(length)
            .collect();
        signal.resize(length, 0.0);
        Ok(signal)
    }
}

/// Non-negative-lag autocorrelation `sum_t x[t] * x[t + lag]` for `lag < max_lags`
///
/// Computed through the power spectrum of the zero-padded signal.
pub fn autocorrelate(values: &[f32], max_lags: usize) -> Result<Vec<f64>> {
    let n = values.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let size = (2 * n).next_power_of_two();
    let mut planner = RealFftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(size);
    let inverse = planner.plan_fft_inverse(size);

    let mut input = forward.make_input_vec();
    for (slot, &value) in input.iter_mut().zip(values) {
        *slot = value as f64;
    }

    let mut spectrum = forward.make_output_vec();
    forward
        .process(&mut input, &mut spectrum)
        .map_err(|e| AudioError::AnalysisFailed {
            reason: format!("autocorrelation FFT failed: {}", e),
        })?;

    for bin in spectrum.iter_mut() {
        *bin = Complex::new(bin.norm_sqr(), 0.0);
    }

    let mut output = inverse.make_output_vec();
    inverse
        .process(&mut spectrum, &mut output)
        .map_err(|e| AudioError::AnalysisFailed {
            reason: format!("autocorrelation inverse FFT failed: {}", e),
        })?;

    let scale = size as f64;
    Ok(output
        .into_iter()
        .take(max_lags.min(n))
        .map(|v| v / scale)
        .collect())
}

/// First-order high-pass `y[n] = x[n] - coef * x[n-1]`
pub fn preemphasis(samples: &[f32], coef: f32) -> Vec<f32> {
    let mut output = Vec::with_capacity(samples.len());
    let mut previous = samples.first().copied().unwrap_or(0.0);
    for (i, &sample) in samples.iter().enumerate() {
        if i == 0 {
            output.push(sample);
        } else {
            output.push(sample - coef * previous);
        }
        previous = sample;
    }
    output
}

/// Band-limited sample rate conversion
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        to_rate as f64 / from_rate as f64,
        2.0,
        params,
        samples.len(),
        1,
    )
    .map_err(|e| AudioError::ResampleFailed {
        reason: format!("resampler init error: {}", e),
    })?;

    let input = vec![samples.to_vec()];
    let output = resampler
        .process(&input, None)
        .map_err(|e| AudioError::ResampleFailed {
            reason: format!("resample error: {}", e),
        })?;

    Ok(output.into_iter().flatten().collect())
}

/// Savitzky-Golay smoothing with polynomial fits at both edges
///
/// The window is shrunk to the largest odd length that fits the data; data
/// too short for any window above `polyorder` is returned unchanged.
pub fn savgol_filter(data: &[f32], window: usize, polyorder: usize) -> Vec<f32> {
    let n = data.len();
    let mut window = window.min(n);
    if window % 2 == 0 {
        window = window.saturating_sub(1);
    }
    if window <= polyorder {
        return data.to_vec();
    }

    let half = window / 2;
    let offsets: Vec<f64> = (0..window).map(|i| i as f64 - half as f64).collect();
    let Some(fit) = PolyFit::new(&offsets, polyorder) else {
        return data.to_vec();
    };

    let mut output = vec![0.0f32; n];
    let center = &fit.pinv[0];
    for i in half..n - half {
        let value: f64 = data[i - half..=i + half]
            .iter()
            .zip(center)
            .map(|(&x, &c)| x as f64 * c)
            .sum();
        output[i] = value as f32;
    }

    let head = fit.coefficients(&data[..window]);
    for (i, slot) in output.iter_mut().enumerate().take(half) {
        *slot = PolyFit::evaluate(&head, i as f64 - half as f64) as f32;
    }

    let tail = fit.coefficients(&data[n - window..]);
    let tail_center = n - 1 - half;
    for (i, slot) in output.iter_mut().enumerate().skip(n - half) {
        *slot = PolyFit::evaluate(&tail, (i - tail_center) as f64) as f32;
    }

    output
}

/// Least-squares polynomial fit over fixed sample positions
struct PolyFit {
    /// Pseudo-inverse of the Vandermonde matrix, one row per coefficient
    pinv: Vec<Vec<f64>>,
}

impl PolyFit {
    fn new(positions: &[f64], order: usize) -> Option<Self> {
        let terms = order + 1;
        let vandermonde: Vec<Vec<f64>> = positions
            .iter()
            .map(|&x| (0..terms).map(|k| x.powi(k as i32)).collect())
            .collect();

        let mut normal = vec![vec![0.0f64; terms]; terms];
        for row in &vandermonde {
            for a in 0..terms {
                for b in 0..terms {
                    normal[a][b] += row[a] * row[b];
                }
            }
        }

        let normal_inv = invert(normal)?;
        let pinv = (0..terms)
            .map(|k| {
                vandermonde
                    .iter()
                    .map(|row| (0..terms).map(|m| normal_inv[k][m] * row[m]).sum())
                    .collect()
            })
            .collect();

        Some(Self { pinv })
    }

    fn coefficients(&self, values: &[f32]) -> Vec<f64> {
        self.pinv
            .iter()
            .map(|row| row.iter().zip(values).map(|(&p, &y)| p * y as f64).sum())
            .collect()
    }

    fn evaluate(coefficients: &[f64], x: f64) -> f64 {
        coefficients.iter().rev().fold(0.0, |acc, &c| acc * x + c)
    }
}

/// Gauss-Jordan inversion with partial pivoting
fn invert(mut matrix: Vec<Vec<f64>>) -> Option<Vec<Vec<f64>>> {
    let n = matrix.len();
    let mut inverse: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for col in 0..n {
        let pivot = (col..n).max_by(|&a, &b| {
            matrix[a][col]
                .abs()
                .partial_cmp(&matrix[b][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if matrix[pivot][col].abs() < 1e-12 {
            return None;
        }
        matrix.swap(col, pivot);
        inverse.swap(col, pivot);

        let scale = matrix[col][col];
        for j in 0..n {
            matrix[col][j] /= scale;
            inverse[col][j] /= scale;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = matrix[row][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                matrix[row][j] -= factor * matrix[col][j];
                inverse[row][j] -= factor * inverse[col][j];
            }
        }
    }

    Some(inverse)
}

/// Sliding median with zero padding at the edges
pub fn median_filter(data: &[f64], kernel: usize) -> Vec<f64> {
    let kernel = if kernel % 2 == 0 { kernel + 1 } else { kernel };
    let half = kernel / 2;
    let mut window = vec![0.0f64; kernel];

    (0..data.len())
        .map(|i| {
            for (k, slot) in window.iter_mut().enumerate() {
                let idx = i as isize + k as isize - half as isize;
                *slot = if idx >= 0 && (idx as usize) < data.len() {
                    data[idx as usize]
                } else {
                    0.0
                };
            }
            window.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            window[half]
        })
        .collect()
}

/// Indices of local maxima at or above `min_height`
///
/// Flat-topped peaks report the middle of the plateau. The first and last
/// samples are never peaks.
pub fn find_peaks(data: &[f64], min_height: f64) -> Vec<usize> {
    let mut peaks = Vec::new();
    if data.len() < 3 {
        return peaks;
    }

    let last = data.len() - 1;
    let mut i = 1;
    while i < last {
        if data[i - 1] < data[i] {
            let mut ahead = i + 1;
            while ahead < last && data[ahead] == data[i] {
                ahead += 1;
            }
            if data[ahead] < data[i] {
                let peak = (i + ahead - 1) / 2;
                if data[peak] >= min_height {
                    peaks.push(peak);
                }
                i = ahead;
                continue;
            }
        }
        i += 1;
    }

    peaks
}

/// Scale so the largest magnitude is 1; `None` for all-zero or non-finite data
pub fn normalize_peak(data: &[f32]) -> Option<Vec<f32>> {
    if data.iter().any(|x| !x.is_finite()) {
        return None;
    }
    let peak = data.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()));
    if peak <= f32::EPSILON {
        return None;
    }
    Some(data.iter().map(|&x| x / peak).collect())
}

/// Sub-sample offset of a parabola's vertex through three equally spaced points
pub fn parabolic_offset(left: f64, center: f64, right: f64) -> f64 {
    let denom = left - 2.0 * center + right;
    if denom.abs() < 1e-12 {
        return 0.0;
    }
    (0.5 * (left - right) / denom).clamp(-0.5, 0.5)
}

/// Median of the values (mean of the middle pair for even counts)
pub fn median(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
