//! Middleware chain subsystem.
//!
//! # Data Flow
//! ```text
//! config.middleware (names)
//!     → registry.rs (name → handler)
//!     → chain.rs (run in order, propagate forwarded requests)
//!         → handler.rs (Continue | Final)
//!     → Proceed → dispatcher
//!     → Respond → response
//! ```

pub mod auth;
pub mod chain;
pub mod handler;
pub mod registry;

pub use auth::{bearer_extractor, IdentityResolver, TokenAuth};
pub use chain::{Chain, ChainOutcome};
pub use handler::{from_fn, Carried, Continuation, Flow, Handler};
pub use registry::{HandlerRegistry, UnknownHandler};
