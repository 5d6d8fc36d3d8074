//! # Observability
//!
//! Logging setup for the server: a `tracing-subscriber` registry with an
//! `EnvFilter`, plain or JSON formatted output, and span helpers.

pub mod logging;

pub use logging::log_config_info;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};

/// Build the log filter. `RUST_LOG` wins over the configured level.
pub fn build_env_filter(config: &ObservabilityConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.log_level).map_err(|e| {
            Error::config(format!("Invalid log level '{}': {}", config.log_level, e))
        }),
    }
}

/// Install the global tracing subscriber
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = build_env_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.json_logging {
        registry.with(fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    installed.map_err(|e| Error::internal(format!("Failed to install log subscriber: {}", e)))
}
