use beatmix::{
    audio::{AudioLoader, AudioWriter, ClickTrack},
    config::Config,
    mix::MixPipeline,
    tempo::TempoEstimationStrategy,
};
use tempfile::tempdir;

const SAMPLE_RATE: u32 = 22050;

fn tracks() -> (beatmix::SampleBuffer, beatmix::SampleBuffer) {
    let track1 = ClickTrack::new(120.0, 60.0, SAMPLE_RATE)
        .with_offset(0.1)
        .with_noise(0.01, 1)
        .render();
    let track2 = ClickTrack::new(130.0, 60.0, SAMPLE_RATE)
        .with_offset(0.3)
        .with_noise(0.01, 2)
        .render();
    (track1, track2)
}

#[tokio::test]
async fn test_fusion_mix_of_120_and_130_bpm() {
    let (track1, track2) = tracks();
    let outcome = MixPipeline::new(Config::default())
        .mix(track1, track2)
        .await
        .unwrap();

    assert!((outcome.tempo1.bpm - 120.0).abs() <= 2.0, "tempo1 {}", outcome.tempo1.bpm);
    assert!((outcome.tempo2.bpm - 130.0).abs() <= 2.0, "tempo2 {}", outcome.tempo2.bpm);
    assert_eq!(outcome.target_bpm, outcome.tempo1.bpm);

    // Song 1 is already at the target; song 2 slows down by ~130/120
    assert!((outcome.stretched_secs.0 - 60.0).abs() < 1e-6);
    let growth = outcome.stretched_secs.1 / 60.0;
    let expected = outcome.tempo2.bpm / outcome.target_bpm;
    assert!((growth - expected).abs() < 1e-3, "growth {} vs {}", growth, expected);
    assert!((growth - 130.0 / 120.0).abs() < 0.03);

    // The transition spans min(5s, overlay) before the overlay and 10s after it
    let plan = outcome.plan;
    assert!(!plan.used_tail_fallback);
    assert!(plan.window_start_ms >= 0.0);
    let expected_ms = plan.overlay_start_ms.trunc().min(5000.0) + 10_000.0;
    assert!(
        (outcome.transition.duration_ms() - expected_ms).abs() <= 1.0,
        "transition {}ms vs {}ms",
        outcome.transition.duration_ms(),
        expected_ms
    );
    assert_eq!(outcome.transition.sample_rate(), SAMPLE_RATE);
    assert!(outcome.transition.peak() <= 1.0);
}

#[tokio::test]
async fn test_constrained_mix_rounds_tempos() {
    let (track1, track2) = tracks();
    let mut config = Config::default();
    config.tempo.strategy = TempoEstimationStrategy::ConstrainedAutocorrelation;
    config.constrained.bpm_min = 110.0;
    config.constrained.bpm_max = 140.0;

    let outcome = MixPipeline::new(config).mix(track1, track2).await.unwrap();

    assert_eq!(outcome.tempo1.bpm, outcome.tempo1.bpm.round());
    assert!((outcome.tempo1.bpm - 120.0).abs() <= 2.0, "tempo1 {}", outcome.tempo1.bpm);
    assert!((outcome.tempo2.bpm - 130.0).abs() <= 2.0, "tempo2 {}", outcome.tempo2.bpm);
    assert_eq!(outcome.target_bpm, outcome.tempo1.bpm);
}

#[tokio::test]
async fn test_mix_files_writes_float_wav() {
    let dir = tempdir().unwrap();
    let (track1, track2) = tracks();
    let path1 = dir.path().join("song1.wav");
    let path2 = dir.path().join("song2.wav");
    let output = dir.path().join("mixed_song.wav");
    AudioWriter::save_wav(&track1, &path1).unwrap();
    AudioWriter::save_wav(&track2, &path2).unwrap();

    let outcome = MixPipeline::new(Config::default())
        .mix_files(&path1, &path2, &output)
        .await
        .unwrap();

    let written = AudioLoader::load(&output).await.unwrap();
    assert_eq!(written, outcome.transition);

    let spec = hound::WavReader::open(&output).unwrap().spec();
    assert_eq!(spec.sample_format, hound::SampleFormat::Float);
    assert_eq!(spec.bits_per_sample, 32);
}
