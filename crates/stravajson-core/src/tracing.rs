//! Tracing setup for stravajson.
//!
//! The binary initialises tracing once at startup:
//! ```ignore
//! use stravajson_core::tracing::{init_tracing, TracingConfig};
//!
//! let config = if verbose { TracingConfig::cli_debug() } else { TracingConfig::cli() };
//! init_tracing(config)?;
//! ```
//! Logs go to stderr so stdout only carries the run's report.
//! `RUST_LOG` takes precedence over the configured default level.

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Target prefix shared by every crate in the workspace.
const TARGET_PREFIX: &str = "stravajson";

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("failed to parse env filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// Log level and decoration for the compact stderr logger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Level for `stravajson*` targets when `RUST_LOG` is unset.
    pub default_level: Level,
    /// Show file and line.
    pub include_location: bool,
    /// Show the module path.
    pub include_target: bool,
    /// Explicit filter directive, used instead of `RUST_LOG`.
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::cli()
    }
}

impl TracingConfig {
    /// Quiet config for normal CLI runs: warnings and errors only.
    #[must_use]
    pub fn cli() -> Self {
        Self {
            default_level: Level::WARN,
            include_location: false,
            include_target: false,
            env_filter: None,
        }
    }

    /// Config for `--verbose` runs.
    #[must_use]
    pub fn cli_debug() -> Self {
        Self {
            default_level: Level::DEBUG,
            include_location: true,
            include_target: true,
            env_filter: None,
        }
    }

    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    fn build_filter(&self) -> Result<EnvFilter, TracingError> {
        if let Some(ref filter) = self.env_filter {
            return Ok(EnvFilter::try_new(filter)?);
        }
        Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{}={}", TARGET_PREFIX, self.default_level))))
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns an error if a global subscriber is already set or the filter
/// directive is invalid.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let layer = fmt::layer()
        .compact()
        .without_time()
        .with_writer(std::io::stderr)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_target(config.include_target);

    let subscriber = tracing_subscriber::registry()
        .with(config.build_filter()?)
        .with(layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
