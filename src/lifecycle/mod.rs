//! Request lifecycle subsystem.
//!
//! # Data Flow
//! ```text
//! Per request (application.rs):
//!     Begin → Init → BeforeRequest → HandlingRequest → AfterRequest → End
//!     (failure anywhere → error_handler.rs → End)
//!
//! Per worker:
//!     memory.rs (limit parsed once, checked by clean())
//!     monitor.rs + events.rs (process-wide, drained every request)
//!
//! Per host:
//!     shutdown.rs (stop accepting → drain workers → exit)
//! ```
//!
//! # Design Decisions
//! - Nothing request-scoped outlives the request's `RequestContext`
//! - Teardown runs on success and failure alike
//! - Monitors shut down in reverse engagement order

pub mod application;
pub mod bootstrap;
pub mod context;
pub mod error_handler;
pub mod events;
pub mod memory;
pub mod monitor;
pub mod shutdown;
pub mod state;

pub use application::{Application, ApplicationBuilder, BuildError};
pub use bootstrap::{Bootstrap, FnBootstrap};
pub use context::RequestContext;
pub use error_handler::ErrorHandler;
pub use events::{Event, EventBus, Payload, PooledConnection, SubscriptionId};
pub use memory::{MemoryGuard, MemoryLimit, MemoryProbe, ProcStatusProbe};
pub use monitor::{ConnectionMonitor, EventMonitor, Monitor};
pub use shutdown::Shutdown;
pub use state::{LifecycleState, EVENT_AFTER_REQUEST, EVENT_BEFORE_REQUEST};
