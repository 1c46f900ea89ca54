//! Shared CLI setup: argument parsing and logging initialization.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// `copytrader` operator interface — one command: `start`.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub enum Cli {
    /// Connect the leader feed and replicate order events to the follower account.
    Start {
        /// Override `LOG_LEVEL` for this run.
        #[arg(long)]
        log_level: Option<String>,
    },
}

/// Initialize tracing, `RUST_LOG`-overridable, falling back to `level`.
pub fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    Ok(())
}
