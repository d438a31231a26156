//! Tracing subscriber setup shared by the binaries.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level; `debug` wins over both.
pub fn init_logging(config: &LoggingConfig, debug: bool) -> Result<()> {
    let env_filter = if debug {
        EnvFilter::new("debug,sqlx=info,hyper=info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn", config.level)))
    };

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if config.format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_target(true).with_current_span(false))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .try_init()
    };

    result.map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))
}
