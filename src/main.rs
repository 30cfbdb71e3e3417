use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn, Level};

use beatmix::{config::Config, mix::MixPipeline, tempo::TempoEstimationStrategy};

#[derive(Parser)]
#[command(
    name = "beatmix",
    version,
    about = "Beat-synchronized DJ transitions between two tracks",
    long_about = "beatmix estimates the tempo of two tracks, stretches both to the slower tempo, aligns their first beats and overlays the second track eight beats before the end of the first, writing the transition window as a float WAV."
)]
struct Cli {
    /// First (outgoing) track (WAV, MP3, FLAC, OGG)
    #[arg(long)]
    track1: PathBuf,

    /// Second (incoming) track
    #[arg(long)]
    track2: PathBuf,

    /// Output WAV file path
    #[arg(short, long, default_value = "mixed_song.wav")]
    output: PathBuf,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tempo strategy (fusion, constrained); overrides the configuration file
    #[arg(short, long)]
    strategy: Option<TempoEstimationStrategy>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(log_level).init();

    info!("Starting beatmix v{}", env!("CARGO_PKG_VERSION"));
    info!("Track 1: {:?}", cli.track1);
    info!("Track 2: {:?}", cli.track2);
    info!("Output: {:?}", cli.output);

    let mut config = match cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(&config_path).map_err(|e| anyhow::anyhow!(e.user_message()))?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };

    if let Some(strategy) = cli.strategy {
        config.tempo.strategy = strategy;
    }
    info!("Tempo strategy: {}", config.tempo.strategy);

    let pipeline = MixPipeline::new(config);
    let outcome = match pipeline
        .mix_files(&cli.track1, &cli.track2, &cli.output)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            if e.is_recoverable() {
                warn!("File access failed; rerunning the same command may succeed");
            }
            return Err(anyhow::anyhow!(e.user_message()));
        }
    };

    info!(
        "Mixed {:.2} BPM and {:.2} BPM at {:.2} BPM",
        outcome.tempo1.bpm, outcome.tempo2.bpm, outcome.target_bpm
    );
    Ok(())
}
