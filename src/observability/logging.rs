//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global tracing subscriber
//! - Pick pretty or JSON output from configuration
//!
//! # Design Decisions
//! - `RUST_LOG` overrides the configured level
//! - Initialization is idempotent; a second call is ignored

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

/// Install the global subscriber described by `config`.
pub fn init(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "flight_stats_api={level},tower_http={level}",
            level = config.log_level
        ))
    });

    let (pretty, json) = match config.log_format {
        LogFormat::Pretty => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    // Fails only when a subscriber is already installed (tests, embedding).
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .try_init();
}
