//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! RequestState (path info, query)
//!     → router.rs (rule lookup, default route, slash normalisation)
//!     → matcher.rs (segment match, placeholder capture)
//!     → (route, params) or NotFound / Redirect
//!     → router.rs (run registered action)
//! ```
//!
//! # Design Decisions
//! - Rules compiled at startup, immutable at runtime
//! - No regex in the hot path
//! - First match wins, in configuration order

pub mod matcher;
pub mod router;

pub use matcher::UrlRule;
pub use router::{Action, ActionResult, Dispatcher, Router};
