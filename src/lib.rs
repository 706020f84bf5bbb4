//! Request lifecycle bridge for long-lived workers.
//!
//! Each worker owns an [`Application`] that turns one inbound message at a
//! time into an outbound message: reset to a clean context, run the
//! middleware chain, dispatch, render errors, tear down, and report when
//! the worker should recycle.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod middleware;
pub mod observability;
pub mod routing;
pub mod security;
pub mod session;
pub mod worker;

pub use config::BridgeConfig;
pub use error::BridgeError;
pub use http::{HttpServer, InboundMessage, OutboundMessage, RequestState, ResponseState};
pub use lifecycle::{Application, LifecycleState, Shutdown};
pub use routing::{ActionResult, Dispatcher, Router};
