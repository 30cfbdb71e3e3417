// Demo binary: mixes two synthetic click tracks end to end

use std::path::PathBuf;

use beatmix::{
    audio::{AudioWriter, ClickTrack},
    config::Config,
    mix::MixPipeline,
    tempo::TempoEstimationStrategy,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("🎵 beatmix synthetic transition demo");

    // Step 1: Generate two tracks at different tempos
    println!("\n1. Generating synthetic tracks...");
    let sample_rate = 22050;
    let track1 = ClickTrack::new(120.0, 60.0, sample_rate)
        .with_offset(0.1)
        .with_noise(0.02, 1)
        .render();
    let track2 = ClickTrack::new(130.0, 60.0, sample_rate)
        .with_offset(0.3)
        .with_noise(0.02, 2)
        .render();
    println!(
        "   ✅ Track 1: 120 BPM, {:.1}s | Track 2: 130 BPM, {:.1}s",
        track1.duration_secs(),
        track2.duration_secs()
    );

    // Step 2: Run the pipeline with each strategy
    for strategy in [
        TempoEstimationStrategy::Fusion,
        TempoEstimationStrategy::ConstrainedAutocorrelation,
    ] {
        println!("\n2. Mixing with the {} strategy...", strategy);

        let mut config = Config::default();
        config.tempo.strategy = strategy;
        // Let the constrained band cover both tracks
        config.constrained.bpm_min = 110.0;
        config.constrained.bpm_max = 140.0;

        let pipeline = MixPipeline::new(config);
        let outcome = pipeline.mix(track1.clone(), track2.clone()).await?;

        println!("   Song 1 tempo: {:.2} BPM", outcome.tempo1.bpm);
        for candidate in &outcome.tempo1.candidates {
            println!(
                "     {:?}: {:.2} BPM (weight {:.3})",
                candidate.method, candidate.bpm, candidate.weight
            );
        }
        println!("   Song 2 tempo: {:.2} BPM", outcome.tempo2.bpm);
        println!("   Target tempo: {:.2} BPM", outcome.target_bpm);
        println!(
            "   Stretched durations: {:.2}s / {:.2}s",
            outcome.stretched_secs.0, outcome.stretched_secs.1
        );
        println!("   Alignment shift: {:+.3}s", outcome.alignment_shift_secs);
        println!(
            "   Overlay at {} (avg beat {:.1}ms, fallback: {})",
            outcome.plan.overlay_start_display(),
            outcome.plan.avg_beat_ms,
            outcome.plan.used_tail_fallback
        );

        let output = PathBuf::from(format!("synth_mix_{}.wav", strategy));
        AudioWriter::save_wav(&outcome.transition, &output)?;
        println!(
            "   ✅ Wrote {:.1}s transition to {}",
            outcome.transition.duration_secs(),
            output.display()
        );
    }

    println!("\n🎉 Demo complete!");
    Ok(())
}
