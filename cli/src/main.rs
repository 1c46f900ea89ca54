//! `copytrader` operator binary.
//!
//! Exit codes: 0 normal shutdown, 1 setup failure, 2 unrecoverable stream
//! exhaustion.

mod common;

use clap::Parser;
use common::{init_logging, Cli};
use copytrader_core::config::Config;
use copytrader_core::{ErrorKind, Orchestrator};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let Cli::Start { log_level } = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = init_logging(log_level.as_deref().unwrap_or(&config.log_level)) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::from(1);
    }

    let orchestrator = match Orchestrator::build(config) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            tracing::error!("setup failed: {e}");
            return ExitCode::from(1);
        }
    };

    match orchestrator.run().await {
        Ok(()) => ExitCode::from(0),
        Err(e) if e.kind() == ErrorKind::Stream => {
            tracing::error!("unrecoverable stream failure: {e}");
            ExitCode::from(2)
        }
        Err(e) => {
            tracing::error!("orchestrator exited with an error: {e}");
            ExitCode::from(1)
        }
    }
}
