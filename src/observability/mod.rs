//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (tracing events with request id, state, status)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Metrics endpoint (Prometheus scrape)
//!     → LogSink implementations flushed at request teardown
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_tracing, LogSink};
