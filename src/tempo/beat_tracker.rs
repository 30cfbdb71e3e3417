use crate::audio::analyzer::{Aggregate, OnsetAnalyzer, OnsetEnvelope};
use crate::audio::types::{BeatGrid, SampleBuffer};
use crate::error::{BeatmixError, Result, TempoError};
use crate::tempo::envelope_tempo;

/// Beats found by the tracker
#[derive(Debug, Clone)]
pub struct TrackedBeats {
    /// Global tempo the tracker locked onto
    pub bpm: f64,

    /// Beat positions as envelope frame indices
    pub frames: Vec<usize>,

    /// Beat positions in seconds
    pub grid: BeatGrid,
}

/// Dynamic-programming beat tracker
///
/// Picks the beat sequence that maximizes onset strength at each beat while
/// penalizing inter-beat intervals that stray from the global tempo period.
/// `tightness` controls how strongly that penalty applies.
#[derive(Debug, Clone)]
pub struct BeatTracker {
    start_bpm: f64,
    tightness: f64,
    n_fft: usize,
    hop_length: usize,
    aggregate: Aggregate,
}

impl BeatTracker {
    pub fn new(start_bpm: f64, tightness: f64) -> Self {
        Self {
            start_bpm,
            tightness,
            n_fft: 2048,
            hop_length: 512,
            aggregate: Aggregate::Mean,
        }
    }

    pub fn with_frames(mut self, n_fft: usize, hop_length: usize) -> Self {
        self.n_fft = n_fft;
        self.hop_length = hop_length;
        self
    }

    pub fn with_aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = aggregate;
        self
    }

    /// Tempo prior the global period is drawn toward
    pub fn start_bpm(&self) -> f64 {
        self.start_bpm
    }

    pub fn tightness(&self) -> f64 {
        self.tightness
    }

    /// Track beats in a buffer
    pub fn track(&self, buffer: &SampleBuffer) -> Result<TrackedBeats> {
        let envelope = OnsetAnalyzer::new(self.n_fft, self.hop_length)
            .with_aggregate(self.aggregate)
            .envelope(buffer)?;
        self.track_envelope(&envelope)
    }

    /// Beat grid of a buffer; arrhythmic or silent input yields an empty grid
    pub fn beat_grid(&self, buffer: &SampleBuffer) -> Result<BeatGrid> {
        match self.track(buffer) {
            Ok(tracked) => Ok(tracked.grid),
            Err(BeatmixError::Tempo(TempoError::DegenerateSignal { reason })) => {
                tracing::debug!("No beat grid ({}), treating track as arrhythmic", reason);
                Ok(BeatGrid::empty())
            }
            Err(e) => Err(e),
        }
    }

    /// Track beats in a precomputed onset envelope
    pub fn track_envelope(&self, envelope: &OnsetEnvelope) -> Result<TrackedBeats> {
        let bpm = envelope_tempo(envelope, self.start_bpm)?;
        let period = ((60.0 * envelope.frame_rate / bpm).round() as usize).max(1);

        let normalized = normalize_by_std(&envelope.values);
        let local_score = local_score(&normalized, period);
        let (backlink, cumscore) = self.dynamic_program(&local_score, period);

        let frames = match last_beat(&cumscore) {
            Some(last) => trim_beats(&local_score, backtrack(&backlink, last)),
            None => Vec::new(),
        };

        let grid = BeatGrid::new(frames.iter().map(|&f| envelope.frame_time(f)).collect());

        tracing::debug!(
            "Beat tracker (prior {:.0} BPM, tightness {:.0}): {:.2} BPM, {} beats",
            self.start_bpm,
            self.tightness,
            bpm,
            grid.len()
        );

        Ok(TrackedBeats { bpm, frames, grid })
    }

    /// Best cumulative score ending at each frame and the predecessor it came from
    fn dynamic_program(&self, local_score: &[f64], period: usize) -> (Vec<isize>, Vec<f64>) {
        let period_f = period as f64;
        let nearest = ((period_f / 2.0).round() as isize).max(1);
        let offsets: Vec<isize> = ((-2 * period as isize)..=-nearest).collect();
        let penalty: Vec<f64> = offsets
            .iter()
            .map(|&o| -self.tightness * (-(o as f64) / period_f).ln().powi(2))
            .collect();

        let threshold = 0.01 * local_score.iter().cloned().fold(f64::MIN, f64::max);
        let mut backlink = vec![-1isize; local_score.len()];
        let mut cumscore = vec![0.0f64; local_score.len()];
        let mut first_beat = true;

        for (i, &score) in local_score.iter().enumerate() {
            let mut best_value = f64::NEG_INFINITY;
            let mut best_prev = -1isize;
            for (&offset, &weight) in offsets.iter().zip(&penalty) {
                let prev = i as isize + offset;
                let value = if prev >= 0 {
                    weight + cumscore[prev as usize]
                } else {
                    weight
                };
                if value > best_value {
                    best_value = value;
                    best_prev = prev;
                }
            }

            cumscore[i] = score + best_value;
            if first_beat && score < threshold {
                backlink[i] = -1;
            } else {
                backlink[i] = best_prev;
                first_beat = false;
            }
        }

        (backlink, cumscore)
    }
}

fn normalize_by_std(values: &[f32]) -> Vec<f64> {
    let n = values.len();
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n.max(1) as f64;
    let variance = values
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / n.saturating_sub(1).max(1) as f64;
    let std = variance.sqrt();

    values
        .iter()
        .map(|&v| if std > 0.0 { v as f64 / std } else { v as f64 })
        .collect()
}

/// Onset strength smoothed by a Gaussian about one beat period wide
fn local_score(onset: &[f64], period: usize) -> Vec<f64> {
    let p = period as isize;
    let kernel: Vec<f64> = (-p..=p)
        .map(|k| (-0.5 * (k as f64 * 32.0 / period as f64).powi(2)).exp())
        .collect();

    (0..onset.len() as isize)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .filter_map(|(k, &w)| {
                    let idx = i + k as isize - p;
                    (idx >= 0 && (idx as usize) < onset.len()).then(|| w * onset[idx as usize])
                })
                .sum::<f64>()
        })
        .collect()
}

/// Last local maximum of the cumulative score above half the median local maximum
fn last_beat(cumscore: &[f64]) -> Option<usize> {
    let n = cumscore.len();
    let is_max = |i: usize| {
        let prev = if i == 0 { cumscore[0] } else { cumscore[i - 1] };
        let next = if i + 1 == n { cumscore[i] } else { cumscore[i + 1] };
        cumscore[i] > prev && cumscore[i] >= next
    };

    let mut maxima: Vec<f64> = (0..n).filter(|&i| is_max(i)).map(|i| cumscore[i]).collect();
    if maxima.is_empty() {
        return None;
    }
    maxima.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = maxima.len() / 2;
    let median = if maxima.len() % 2 == 0 {
        (maxima[mid - 1] + maxima[mid]) / 2.0
    } else {
        maxima[mid]
    };

    (0..n).rev().find(|&i| is_max(i) && cumscore[i] > 0.5 * median)
}

fn backtrack(backlink: &[isize], last: usize) -> Vec<usize> {
    let mut beats = vec![last];
    let mut current = last;
    while backlink[current] >= 0 {
        current = backlink[current] as usize;
        beats.push(current);
    }
    beats.reverse();
    beats
}

/// Drop weak beats at either end, judged against a smoothed beat-strength RMS
fn trim_beats(local_score: &[f64], beats: Vec<usize>) -> Vec<usize> {
    if beats.is_empty() {
        return beats;
    }

    const HANNING_5: [f64; 5] = [0.0, 0.5, 1.0, 0.5, 0.0];
    let strengths: Vec<f64> = beats.iter().map(|&b| local_score[b]).collect();
    let smooth: Vec<f64> = (0..strengths.len() as isize)
        .map(|i| {
            HANNING_5
                .iter()
                .enumerate()
                .filter_map(|(k, &w)| {
                    let idx = i + k as isize - 2;
                    (idx >= 0 && (idx as usize) < strengths.len())
                        .then(|| w * strengths[idx as usize])
                })
                .sum::<f64>()
        })
        .collect();

    let rms = (smooth.iter().map(|s| s * s).sum::<f64>() / smooth.len() as f64).sqrt();
    let threshold = 0.5 * rms;

    let first = smooth.iter().position(|&s| s > threshold);
    let last = smooth.iter().rposition(|&s| s > threshold);
    match (first, last) {
        (Some(first), Some(last)) => beats[first..=last].to_vec(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::synth::ClickTrack;

    #[test]
    fn test_tracks_click_track_beats() {
        let track = ClickTrack::new(120.0, 12.0, 22050).with_offset(0.3);
        let tracked = BeatTracker::new(120.0, 100.0).track(&track.render()).unwrap();

        assert!((tracked.bpm - 120.0).abs() < 3.0, "bpm {}", tracked.bpm);
        assert!(tracked.grid.len() >= 18, "only {} beats", tracked.grid.len());

        let expected = track.beat_times();
        for &time in tracked.grid.times() {
            let nearest = expected
                .iter()
                .map(|&e| (e - time).abs())
                .fold(f64::MAX, f64::min);
            assert!(nearest < 0.05, "beat at {} is {}s off the grid", time, nearest);
        }

        let interval = tracked.grid.average_interval().unwrap();
        assert!((interval - 0.5).abs() < 0.02, "interval {}", interval);
    }

    #[test]
    fn test_silence_gives_empty_grid() {
        let silence = SampleBuffer::new(vec![0.0; 22050 * 4], 22050).unwrap();
        let grid = BeatTracker::new(120.0, 100.0).beat_grid(&silence).unwrap();
        assert!(grid.is_empty());
    }

    #[test]
    fn test_backtrack_follows_links() {
        let backlink = [-1, -1, 0, -1, 2, 3, 4];
        assert_eq!(backtrack(&backlink, 6), vec![0, 2, 4, 6]);
    }

    #[test]
    fn test_trim_drops_weak_edges() {
        let mut local = vec![0.0; 60];
        for beat in [10, 20, 30, 40] {
            local[beat] = 1.0;
        }
        local[50] = 0.01;
        let trimmed = trim_beats(&local, vec![0, 10, 20, 30, 40, 50]);
        assert_eq!(trimmed.first(), Some(&10));
        assert_eq!(trimmed.last(), Some(&40));
    }

    #[test]
    fn test_last_beat_ignores_trailing_decline() {
        let cumscore = [0.0, 1.0, 0.5, 2.0, 1.5, 3.0, 2.5, 2.0];
        assert_eq!(last_beat(&cumscore), Some(5));
    }
}
