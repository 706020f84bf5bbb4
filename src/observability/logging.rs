//! Structured logging.
//!
//! # Responsibilities
//! - Install the global `tracing` subscriber (env filter + fmt layer)
//! - Define the `LogSink` boundary flushed by the controller at teardown
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level
//! - Installing twice is not an error (tests and embedders may have done it)

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Default filter when neither `RUST_LOG` nor a configured level is set.
pub const DEFAULT_FILTER: &str = "worker_bridge=debug,tower_http=debug";

/// A buffered log destination owned by the application.
pub trait LogSink: Send + Sync {
    fn flush(&self);
}

/// Install the global subscriber.
pub fn init_tracing(config: &ObservabilityConfig) {
    let fallback = if config.log_level.trim().is_empty() {
        DEFAULT_FILTER.to_string()
    } else {
        config.log_level.clone()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    if tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_err()
    {
        tracing::debug!("Tracing subscriber already installed");
    }
}
