//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BridgeConfig (validated, immutable)
//!     → shared via Arc to every per-request context
//!
//! env.rs reads path aliases from the environment once at startup.
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload path
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod env;
pub mod loader;
pub mod schema;
pub mod validation;

pub use env::Aliases;
pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AppConfig, BridgeConfig, ListenerConfig, ObservabilityConfig, ParserKind, RequestConfig,
    RoutingConfig, RuleConfig, SessionConfig, WorkerConfig,
};
