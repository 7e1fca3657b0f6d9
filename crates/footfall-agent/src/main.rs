use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

mod oracle;
mod replay;
mod runner;
mod submit;

use oracle::OracleError;
use replay::ReplayOracle;
use runner::{PipelineRunner, RunnerConfig};
use submit::{DbusSink, DetectionSink};

#[derive(Parser)]
#[command(name = "footfall-agent", about = "Footfall kiosk agent — detection pipeline runner")]
struct Cli {
    /// JSON-lines file of observation frames to replay
    #[arg(short, long)]
    input: PathBuf,

    /// Milliseconds between pipeline ticks
    #[arg(long, default_value_t = 500)]
    interval_ms: u64,

    /// Quality and locking preset
    #[arg(long, value_enum, default_value_t = Mode::Standard)]
    mode: Mode,

    /// Camera frame width in pixels
    #[arg(long, default_value_t = 640.0)]
    frame_width: f32,

    /// Camera frame height in pixels
    #[arg(long, default_value_t = 480.0)]
    frame_height: f32,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Close-range kiosk: permissive quality floor, fast lock
    Kiosk,
    /// Overhead/standoff camera: strict quality floor, slow lock
    Standard,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = match cli.mode {
        Mode::Kiosk => RunnerConfig::kiosk(),
        Mode::Standard => RunnerConfig::standard(),
    };
    config.frame_width = cli.frame_width;
    config.frame_height = cli.frame_height;

    let mut oracle = ReplayOracle::open(&cli.input)?;
    tracing::info!(input = %cli.input.display(), frames = oracle.remaining(), "replay loaded");

    let mut sink = DbusSink::connect().await?;
    let mut runner = PipelineRunner::new(config);

    let mut interval = tokio::time::interval(Duration::from_millis(cli.interval_ms));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                match runner.tick(&mut oracle).await {
                    Ok(Some(submission)) => {
                        let outcome = sink.submit(&submission).await?;
                        submit::log_outcome(&outcome);
                    }
                    Ok(None) => {}
                    Err(OracleError::Exhausted) => {
                        tracing::info!("input exhausted, stopping");
                        break;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, stopping");
                break;
            }
        }
    }

    runner.stop();
    Ok(())
}
