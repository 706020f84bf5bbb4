//! Session subsystem.
//!
//! The backend is a pooled resource and outlives requests; each request gets
//! its own [`Session`] handle, opened and closed by the lifecycle controller.

pub mod store;

pub use store::{MemorySessionBackend, Session, SessionBackend, SessionData};
