//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global tracing subscriber
//! - Pick the log filter from RUST_LOG or the config
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - Log level configurable via config and environment

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Filter from RUST_LOG when set, the configured level otherwise.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Install the global subscriber.
pub fn init(config: &LoggingConfig) {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    if config.pretty {
        registry.with(fmt::layer().pretty()).init();
    } else {
        registry
            .with(fmt::layer().json().flatten_event(true).with_current_span(true))
            .init();
    }
}
