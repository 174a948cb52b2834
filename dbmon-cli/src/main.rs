//! Database monitoring configuration tool.
//!
//! This binary turns database descriptors into the canonical document the
//! monitoring agent's MySQL and PostgreSQL integrations consume.
//!
//! # Security Guarantees
//! - Resolved passwords are never logged
//! - Credential source markers never reach the output
//! - Output files are written atomically with owner-only permissions
//!
//! # Exit Codes
//! - 0: success, no error-severity issues
//! - 1: error-severity issues, or input documents that could not be used
//! - 2: any other failure

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use dbmon_cli::{Cli, Command, RunStatus, commands, failure_code};
use dbmon_core::init_logging;
use tracing::error;

async fn run(cli: &Cli) -> anyhow::Result<RunStatus> {
    match &cli.command {
        Command::Transform(args) => commands::transform(args)
            .await
            .context("Transform failed"),
        Command::Validate(args) => commands::validate(args)
            .await
            .context("Validation failed"),
        Command::Discover(args) => commands::discover_resources(args)
            .await
            .context("Discovery failed"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    if let Err(e) = init_logging(cli.global.verbose, cli.global.quiet, cli.global.log_format) {
        eprintln!("Error: {}", e);
        return ExitCode::from(2);
    }

    match run(&cli).await {
        Ok(status) => status.into(),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(failure_code(&e))
        }
    }
}
