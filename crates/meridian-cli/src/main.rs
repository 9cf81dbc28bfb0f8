//! Meridian command line.
//!
//! Runs the banking demonstration on the simulator and exposes the pieces
//! it is built from.
//!
//! # Quick Start
//!
//! ```bash
//! # Run the client/server demo with reproducible positions and amounts
//! meridian demo --seed 7
//!
//! # Sample the latency between two random points
//! meridian latency --samples 10
//!
//! # Show the effective configuration
//! meridian config show
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use meridian_config::MeridianConfig;
use tracing_subscriber::EnvFilter;

/// Meridian - simulate message passing between nodes spread over a sphere.
#[derive(Parser)]
#[command(name = "meridian")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory holding meridian.toml and meridian.local.toml.
    #[arg(short = 'C', long, global = true, default_value = ".")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Run the banking demo: an asynchronous server and a synchronous client.
    Demo {
        /// Number of requests the client sends (overrides configuration).
        #[arg(short, long)]
        requests: Option<u32>,

        /// Seed for positions, jitter and amounts (overrides configuration).
        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// Sample the latency between two random positions.
    Latency {
        /// Number of samples to draw.
        #[arg(short = 'n', long, default_value = "20")]
        samples: u32,

        /// Seed for the positions and the jitter.
        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// Configuration commands.
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML.
    Show,

    /// Print the configuration files that are consulted, in load order.
    Paths,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Version) {
        commands::version::run();
        return Ok(());
    }

    let config = MeridianConfig::load_from_dir(&cli.dir).with_context(|| {
        format!("Failed to load configuration from {}", cli.dir.display())
    })?;

    // RUST_LOG wins over the configured filter.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .context("Invalid logging filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Version => Ok(()),
        Commands::Demo { requests, seed } => commands::demo::run(config, requests, seed),
        Commands::Latency { samples, seed } => commands::latency::run(&config, samples, seed),
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show => commands::config::show(&config),
            ConfigCommands::Paths => commands::config::paths(&cli.dir),
        },
    }
}
