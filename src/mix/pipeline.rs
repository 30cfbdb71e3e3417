use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::{
    audio::{AudioLoader, AudioWriter, BeatGrid, MixPlan, SampleBuffer, TempoEstimate},
    config::Config,
    error::{BeatmixError, MixError, Result},
    mix::{AlignedPair, BeatAligner, CrossfadeCompositor, Transition},
    stretch::TimeStretcher,
    tempo::{BeatTracker, TempoEstimator},
};

/// Everything a mix run produced
#[derive(Debug, Clone)]
pub struct MixOutcome {
    /// Extracted transition audio at song 1's sample rate
    pub transition: SampleBuffer,

    /// Crossfade geometry used for the transition
    pub plan: MixPlan,

    pub tempo1: TempoEstimate,
    pub tempo2: TempoEstimate,

    /// Common tempo both tracks were stretched to
    pub target_bpm: f64,

    /// First-beat offset applied by the aligner (seconds)
    pub alignment_shift_secs: f64,

    /// Durations of both tracks after stretching (seconds)
    pub stretched_secs: (f64, f64),
}

/// Orchestrates a beat-synchronized transition between two tracks
///
/// The pipeline follows these steps:
/// 1. Tempo Estimation - Estimate both tracks' BPM concurrently
/// 2. Time Stretching - Bring both tracks to the slower tempo
/// 3. Beat Alignment - Line up the first beats of both tracks
/// 4. Crossfade - Overlay song 2 eight beats before the end of song 1
pub struct MixPipeline {
    config: Config,
    estimator: Arc<dyn TempoEstimator>,
}

impl MixPipeline {
    /// Create a pipeline using the configured tempo strategy
    pub fn new(config: Config) -> Self {
        let estimator = config.tempo.strategy.estimator(&config);
        Self { config, estimator }
    }

    /// Create a pipeline with a custom tempo estimator
    pub fn with_estimator(config: Config, estimator: Arc<dyn TempoEstimator>) -> Self {
        Self { config, estimator }
    }

    /// Load two audio files, mix them, and write the transition as a float WAV
    pub async fn mix_files<P: AsRef<Path>>(
        &self,
        track1_path: P,
        track2_path: P,
        output_path: P,
    ) -> Result<MixOutcome> {
        let output_path = output_path.as_ref();

        let track1 = AudioLoader::load(track1_path.as_ref()).await?;
        let track2 = AudioLoader::load(track2_path.as_ref()).await?;
        info!("Song 1 sample rate: {}", track1.sample_rate());
        info!("Song 2 sample rate: {}", track2.sample_rate());

        let outcome = self.mix(track1, track2).await?;
        AudioWriter::save_wav(&outcome.transition, output_path)?;

        info!("🎉 Mix complete! Output saved to: {:?}", output_path);
        Ok(outcome)
    }

    /// Produce a beat-synchronized transition from song 1 into song 2
    pub async fn mix(&self, track1: SampleBuffer, track2: SampleBuffer) -> Result<MixOutcome> {
        let secs = self.config.pipeline.timeout_secs;
        match tokio::time::timeout(Duration::from_secs(secs), self.run(track1, track2)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Mix did not finish within {}s", secs);
                Err(MixError::PipelineTimeout { secs }.into())
            }
        }
    }

    async fn run(&self, track1: SampleBuffer, track2: SampleBuffer) -> Result<MixOutcome> {
        info!("🎧 Starting beatmix transition");
        info!("   Tempo strategy: {}", self.estimator.name());
        info!(
            "   Song 1: {:.1}s at {} Hz",
            track1.duration_secs(),
            track1.sample_rate()
        );
        info!(
            "   Song 2: {:.1}s at {} Hz",
            track2.duration_secs(),
            track2.sample_rate()
        );

        let track1 = Arc::new(track1);
        let track2 = Arc::new(track2);

        // Pipeline Step 1: Tempo Estimation
        let (tempo1, tempo2) = self.estimate_tempos(&track1, &track2).await?;

        // Pipeline Step 2: Time Stretching
        let target_bpm = tempo1.bpm.min(tempo2.bpm);
        let (stretched1, stretched2) = self
            .stretch_to_target(track1, tempo1.bpm, track2, tempo2.bpm, target_bpm)
            .await?;
        let stretched_secs = (stretched1.duration_secs(), stretched2.duration_secs());

        // Pipeline Step 3: Beat Alignment
        let aligned = self.align_tracks(stretched1, stretched2).await?;
        let alignment_shift_secs = aligned.shift_secs;

        // Pipeline Step 4: Crossfade
        let transition = self.compose_transition(aligned).await?;

        info!(
            "🎉 Transition ready: {:.1}s at {} Hz",
            transition.buffer.duration_secs(),
            transition.buffer.sample_rate()
        );

        Ok(MixOutcome {
            transition: transition.buffer,
            plan: transition.plan,
            tempo1,
            tempo2,
            target_bpm,
            alignment_shift_secs,
            stretched_secs,
        })
    }

    // ==========================================
    // PIPELINE STEP 1: TEMPO ESTIMATION
    // ==========================================

    async fn estimate_tempos(
        &self,
        track1: &Arc<SampleBuffer>,
        track2: &Arc<SampleBuffer>,
    ) -> Result<(TempoEstimate, TempoEstimate)> {
        info!("🎵 Step 1: Estimating tempos...");

        let task1 = {
            let (estimator, track) = (Arc::clone(&self.estimator), Arc::clone(track1));
            tokio::task::spawn_blocking(move || estimator.estimate(&track))
        };
        let task2 = {
            let (estimator, track) = (Arc::clone(&self.estimator), Arc::clone(track2));
            tokio::task::spawn_blocking(move || estimator.estimate(&track))
        };

        let (result1, result2) = tokio::join!(task1, task2);
        let tempo1 = result1.map_err(task_failed)??;
        let tempo2 = result2.map_err(task_failed)??;

        for (label, tempo) in [("Song 1", &tempo1), ("Song 2", &tempo2)] {
            if !tempo.is_plausible() {
                warn!(
                    "{} tempo {:.2} BPM is outside {}-{} BPM, likely an octave error",
                    label,
                    tempo.bpm,
                    TempoEstimate::PLAUSIBLE_MIN_BPM,
                    TempoEstimate::PLAUSIBLE_MAX_BPM
                );
            }
        }

        info!("   ✅ Song 1 BPM: {:.2}", tempo1.bpm);
        info!("   ✅ Song 2 BPM: {:.2}", tempo2.bpm);
        Ok((tempo1, tempo2))
    }

    // ==========================================
    // PIPELINE STEP 2: TIME STRETCHING
    // ==========================================

    async fn stretch_to_target(
        &self,
        track1: Arc<SampleBuffer>,
        bpm1: f64,
        track2: Arc<SampleBuffer>,
        bpm2: f64,
        target_bpm: f64,
    ) -> Result<(SampleBuffer, SampleBuffer)> {
        info!("⏱️  Step 2: Stretching both tracks to {:.2} BPM...", target_bpm);

        let stretcher = TimeStretcher::with_config(&self.config.stretch);
        let task1 = {
            let stretcher = stretcher.clone();
            tokio::task::spawn_blocking(move || stretcher.stretch(&track1, bpm1, target_bpm))
        };
        let task2 =
            tokio::task::spawn_blocking(move || stretcher.stretch(&track2, bpm2, target_bpm));

        let (result1, result2) = tokio::join!(task1, task2);
        let stretched1 = result1.map_err(task_failed)??;
        let stretched2 = result2.map_err(task_failed)??;

        info!(
            "   ✅ Stretched durations: {:.2}s and {:.2}s",
            stretched1.duration_secs(),
            stretched2.duration_secs()
        );
        Ok((stretched1, stretched2))
    }

    // ==========================================
    // PIPELINE STEP 3: BEAT ALIGNMENT
    // ==========================================

    async fn align_tracks(&self, song1: SampleBuffer, song2: SampleBuffer) -> Result<AlignedPair> {
        info!("🥁 Step 3: Aligning first beats...");

        let fraction = self.config.mix.alignment_fraction;
        let head1 = song1.truncated(song1.duration_secs() * fraction);
        let head2 = song2.truncated(song2.duration_secs() * fraction);

        let task1 = {
            let tracker = self.grid_tracker();
            tokio::task::spawn_blocking(move || tracker.beat_grid(&head1))
        };
        let task2 = {
            let tracker = self.grid_tracker();
            tokio::task::spawn_blocking(move || tracker.beat_grid(&head2))
        };

        let (result1, result2) = tokio::join!(task1, task2);
        let grid1 = result1.map_err(task_failed)??;
        let grid2 = result2.map_err(task_failed)??;

        debug!(
            "First beats: song 1 at {:.3}s ({} beats), song 2 at {:.3}s ({} beats)",
            grid1.first_or_zero(),
            grid1.len(),
            grid2.first_or_zero(),
            grid2.len()
        );

        let aligned = BeatAligner::align(song1, &grid1, song2, &grid2);
        info!("   ✅ Alignment shift: {:+.3}s", aligned.shift_secs);
        Ok(aligned)
    }

    // ==========================================
    // PIPELINE STEP 4: CROSSFADE
    // ==========================================

    async fn compose_transition(&self, aligned: AlignedPair) -> Result<Transition> {
        info!("🎚️  Step 4: Composing crossfade...");

        let tracker = self.grid_tracker();
        let compositor = CrossfadeCompositor::new(&self.config.mix);

        let task = tokio::task::spawn_blocking(move || -> Result<(BeatGrid, Transition)> {
            let grid1 = tracker.beat_grid(&aligned.song1)?;
            let transition = compositor.compose(&aligned.song1, &aligned.song2, &grid1)?;
            Ok((grid1, transition))
        });
        let (grid1, transition) = task.await.map_err(task_failed)??;

        info!("   ✅ Song 1 grid: {} beats", grid1.len());
        info!(
            "   ✅ Overlay at {} ({:.1}s window)",
            transition.plan.overlay_start_display(),
            transition.plan.window_len_ms() / 1000.0
        );
        Ok(transition)
    }

    fn grid_tracker(&self) -> BeatTracker {
        BeatTracker::new(self.config.mix.grid_prior_bpm, self.config.mix.grid_tightness)
            .with_frames(self.config.tempo.n_fft, self.config.tempo.hop_length)
    }
}

fn task_failed(e: JoinError) -> BeatmixError {
    MixError::TaskFailed {
        reason: e.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::synth::ClickTrack;
    use crate::audio::types::{TempoCandidate, TempoMethod};
    use crate::error::TempoError;
    use crate::tempo::TempoEstimationStrategy;

    /// Reports a fixed tempo after an optional delay
    struct FixedTempo {
        bpm: f64,
        delay: Duration,
    }

    impl TempoEstimator for FixedTempo {
        fn name(&self) -> &str {
            "fixed"
        }

        fn strategy(&self) -> TempoEstimationStrategy {
            TempoEstimationStrategy::Fusion
        }

        fn estimate(&self, _buffer: &SampleBuffer) -> Result<TempoEstimate> {
            std::thread::sleep(self.delay);
            Ok(TempoEstimate {
                bpm: self.bpm,
                candidates: vec![TempoCandidate {
                    method: TempoMethod::BeatTracker,
                    bpm: self.bpm,
                    weight: 1.0,
                }],
                beats: BeatGrid::empty(),
                strategy: TempoEstimationStrategy::Fusion,
            })
        }
    }

    fn fixed(bpm: f64, delay: Duration) -> Arc<dyn TempoEstimator> {
        Arc::new(FixedTempo { bpm, delay })
    }

    #[tokio::test]
    async fn test_equal_tempos_skip_stretching() {
        let track1 = ClickTrack::new(120.0, 20.0, 11025).render();
        let track2 = ClickTrack::new(120.0, 16.0, 11025).with_offset(0.2).render();
        let pipeline = MixPipeline::with_estimator(Config::default(), fixed(120.0, Duration::ZERO));

        let outcome = pipeline.mix(track1, track2).await.unwrap();

        assert_eq!(outcome.target_bpm, 120.0);
        assert_eq!(outcome.stretched_secs, (20.0, 16.0));
        assert_eq!(outcome.transition.sample_rate(), 11025);
        assert!(outcome.plan.window_start_ms >= 0.0);
        assert!(outcome.transition.duration_ms() <= 15_000.0 + 1.0);
    }

    #[tokio::test]
    async fn test_timeout_aborts_run() {
        let mut config = Config::default();
        config.pipeline.timeout_secs = 1;
        let pipeline = MixPipeline::with_estimator(config, fixed(120.0, Duration::from_millis(2500)));

        let track = ClickTrack::new(120.0, 6.0, 8000).render();
        let result = pipeline.mix(track.clone(), track).await;
        assert!(matches!(
            result,
            Err(BeatmixError::Mix(MixError::PipelineTimeout { secs: 1 }))
        ));
    }

    #[tokio::test]
    async fn test_first_error_is_propagated() {
        let pipeline = MixPipeline::new(Config::default());
        let short = ClickTrack::new(120.0, 3.0, 8000).render();
        let long = ClickTrack::new(120.0, 10.0, 8000).render();

        let result = pipeline.mix(short, long).await;
        assert!(matches!(
            result,
            Err(BeatmixError::Tempo(TempoError::InsufficientAudio { .. }))
        ));
    }
}
