//! Logging subscriber setup
//!
//! ```text
//! Registry
//!   ├── EnvFilter (RUST_LOG, else the configured level)
//!   └── Fmt Layer (json or pretty)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use gstore_uploadr::config::LoggingConfig;
//! use gstore_uploadr::telemetry::init_subscriber;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! init_subscriber(&LoggingConfig::default())?;
//! # Ok(())
//! # }
//! ```

use crate::config::{LogFormat, LoggingConfig};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

/// Errors that can occur during subscriber initialization
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),

    #[error("Failed to set global subscriber (may already be initialized): {0}")]
    AlreadyInitialized(String),
}

/// Filter from `RUST_LOG`, falling back to `level`
fn env_filter(level: &str) -> Result<EnvFilter, TelemetryError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => {
            EnvFilter::try_new(level).map_err(|e| TelemetryError::InvalidFilter(e.to_string()))
        }
    }
}

/// Install the global subscriber
pub fn init_subscriber(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let env_filter = env_filter(&config.level)?;

    match config.format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_current_span(true);

            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer);

            tracing::subscriber::set_global_default(subscriber)
                .map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))?;
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_target(true)
                .with_line_number(true);

            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer);

            tracing::subscriber::set_global_default(subscriber)
                .map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))?;
        }
    }

    Ok(())
}
