//! Signal Sentry - screening pipeline and adaptation loop for memecoin signals
//!
//! Offline entry point: replays signal batches and trade history against
//! recorded collaborator fixtures.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

use signal_sentry::cli::commands;
use signal_sentry::config::{Config, LoggingConfig};

/// Signal Sentry - multi-stage signal screening
#[derive(Parser)]
#[command(name = "sentry")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Screen a batch of signals from a JSON file
    Filter {
        /// JSON array of signals
        #[arg(long)]
        signals: PathBuf,

        /// Recorded collaborator answers (on-chain, social, honeypot)
        #[arg(long)]
        fixtures: Option<PathBuf>,
    },

    /// Run one adaptation cycle over recorded trades and prices
    Adapt {
        /// JSON array of closed trades
        #[arg(long)]
        trades: PathBuf,

        /// JSON array of prices, oldest first
        #[arg(long)]
        prices: PathBuf,

        /// Evaluation time (RFC 3339); defaults to the newest trade
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Run the adaptation loop over recorded trades and prices until Ctrl+C
    Watch {
        /// Fixture file with `trades` and `prices`
        #[arg(long)]
        fixtures: PathBuf,
    },

    /// Show current configuration
    Config,

    /// Validate configuration and stage wiring
    Check,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("signal_sentry={}", logging.level)));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_line_number(true)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration, then initialize tracing from its logging section
    let loaded = Config::load(&cli.config);
    let logging = loaded
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    init_tracing(&logging);

    let config = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Filter { signals, fixtures } => {
            commands::filter(&config, &signals, fixtures.as_deref()).await
        }
        Commands::Adapt { trades, prices, at } => {
            commands::adapt(&config, &trades, &prices, at).await
        }
        Commands::Watch { fixtures } => commands::watch(&config, &fixtures).await,
        Commands::Config => commands::show_config(&config),
        Commands::Check => commands::check(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
