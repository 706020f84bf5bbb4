//! HTTP model of the bridge.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum front, request id, limits, timeout)
//!     → adapter.rs (axum request → InboundMessage)
//!     → [worker channel → Application]
//!     → request.rs (lazy RequestState over the message)
//!     → response.rs (ResponseState, finalize)
//!     → adapter.rs (ResponseState → OutboundMessage → axum response)
//!     → Send to client
//! ```

pub mod adapter;
pub mod cookie;
pub mod message;
pub mod params;
pub mod parsers;
pub mod request;
pub mod response;
pub mod server;
pub mod stream;

pub use adapter::{to_internal, to_wire};
pub use cookie::{Cookie, CookieJar, SameSite};
pub use message::{InboundMessage, OutboundBody, OutboundMessage};
pub use params::Params;
pub use request::{Identity, RequestSettings, RequestState};
pub use response::{ResponseFormat, ResponseState, SendFileOptions};
pub use server::HttpServer;
