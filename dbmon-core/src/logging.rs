//! Shared logging setup for the dbmon binary.
//!
//! Diagnostics always go to stderr so that `--dry-run` output on stdout can be
//! piped without interleaved log lines.

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

use crate::Result;
use crate::error::DbMonError;

/// Log line formatting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable single-line output
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = DbMonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(DbMonError::configuration(format!(
                "unknown log format '{}', expected 'text' or 'json'",
                other
            ))),
        }
    }
}

/// Maps CLI verbosity flags to a default level.
///
/// `RUST_LOG` still wins when it is set.
pub fn level_for(verbose: u8, quiet: bool) -> tracing::Level {
    match (quiet, verbose) {
        (true, _) => tracing::Level::ERROR,
        (false, 0) => tracing::Level::INFO,
        (false, 1) => tracing::Level::DEBUG,
        (false, _) => tracing::Level::TRACE,
    }
}

/// Initializes structured logging based on verbosity level.
///
/// # Arguments
/// * `verbose` - Verbosity level (0=INFO, 1=DEBUG, 2+=TRACE)
/// * `quiet` - If true, only show ERROR level logs
/// * `format` - Text or JSON event formatting
///
/// # Errors
/// Returns a configuration error if a global subscriber is already installed.
///
/// # Example
/// ```rust,no_run
/// use dbmon_core::logging::{init_logging, LogFormat};
///
/// init_logging(1, false, LogFormat::Text).expect("Failed to initialize logging");
/// ```
pub fn init_logging(verbose: u8, quiet: bool, format: LogFormat) -> Result<()> {
    let level = level_for(verbose, quiet);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.map_err(|e| {
        DbMonError::configuration(format!("Failed to initialize logging: {}", e))
    })
}
