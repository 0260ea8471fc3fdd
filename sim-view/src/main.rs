//! Application entry point for the swirly aggregate viewer.
//!
//! By default this opens an eframe/egui window driven by [`Viewer`]. With
//! `--headless` it runs a fixed number of frames and logs aggregate
//! summaries through `tracing` instead.

mod headless;
mod settings;
mod viewer;

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::info;
use viewer::Viewer;

#[derive(Parser, Debug)]
#[command(
    name = "swirly",
    version,
    about = "Toroidal blob aggregate simulation"
)]
struct Cli {
    /// JSON configuration file; missing keys fall back to defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the RNG seed from the configuration.
    #[arg(long)]
    seed: Option<u64>,

    /// Run without a window, logging aggregate summaries.
    #[arg(long)]
    headless: bool,

    /// Number of frames to run in headless mode.
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    frames: u64,

    /// Log every aggregate once per this many frames in headless mode.
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    log_interval: u64,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = settings::load(cli.config.as_deref(), cli.seed)?;

    if cli.headless {
        return headless::run(config, cli.frames, cli.log_interval);
    }

    let viewer = Viewer::new(config)?;
    info!(seed = viewer.seed(), "opening viewer");
    eframe::run_native(
        "Swirly",
        eframe::NativeOptions::default(),
        Box::new(|_cc| Ok(Box::new(viewer))),
    )
    .map_err(|err| anyhow!("viewer failed: {err}"))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
