//! Junction simulator CLI
//!
//! Run a junction for a fixed stretch of simulated time and summarise what happened.
//!
//! # Example
//!
//! ```bash
//! # The default four-way junction for an hour, with a fixed seed
//! junction-sim --seed 42 -d 3600
//!
//! # A junction from a JSON config, writing every event as JSON lines
//! junction-sim --config junction.json --events events.jsonl
//! ```

use std::{
    error::Error,
    fs::File,
    io::{self, BufWriter},
    path::PathBuf,
    time::Duration,
};

use clap::Parser;
use junction_scheduler::{Junction, JunctionConfig, JunctionMetrics, Reporter, Step};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Junction simulator
///
/// Runs a discrete-event simulation of a single junction. Reproducible when the same
/// configuration and seed are used.
#[derive(Parser, Debug)]
#[command(name = "junction-sim")]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON configuration file. The default four-way junction is used when omitted.
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Random seed. Overrides the configured seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Simulated duration in seconds. Overrides the configured horizon.
    #[arg(short = 'd', long)]
    duration: Option<f64>,

    /// Write every event as JSON lines to this file, or `-` for stdout.
    #[arg(short = 'e', long)]
    events: Option<PathBuf>,
}

const DEFAULT_DURATION: Duration = Duration::from_secs(3600);

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,junction_scheduler=info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => serde_json::from_reader(File::open(path)?)?,
        None => JunctionConfig::default(),
    };

    if let Some(seed) = args.seed {
        config.random_seed = seed;
    }
    match args.duration {
        Some(secs) => {
            let duration = Duration::try_from_secs_f64(secs)?;
            config.horizon = Some(config.start_time.saturating_add(duration));
        }
        None if config.horizon.is_none() => {
            config.horizon = Some(config.start_time.saturating_add(DEFAULT_DURATION))
        }
        None => {}
    }

    info!(
        lanes = config.lanes.len() as u64,
        seed = config.random_seed,
        horizon = ?config.horizon,
        "Starting simulation"
    );

    let mut junction = Junction::new(config.clone())?;
    let finished = junction.run()?;
    info!(?finished, now = ?junction.now(), "Simulation finished");
    if finished == Step::Drained {
        info!("No events left before the horizon");
    }

    let log = junction.event_log();
    match args.events.as_deref() {
        Some(path) if path.as_os_str() == "-" => log.write_json_lines(io::stdout().lock())?,
        Some(path) => log.write_json_lines(BufWriter::new(File::create(path)?))?,
        None => {}
    }

    let metrics = JunctionMetrics::from_events(log.events());
    let snapshot = junction.snapshot();
    Reporter::new(&metrics)
        .with_config(&config)
        .with_final_state(&snapshot)
        .print_summary(io::stdout().lock())?;

    Ok(())
}
