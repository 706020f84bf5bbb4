//! Wire transport contract and the worker loop.
//!
//! # Data Flow
//! ```text
//! loop:
//!     transport.accept_request() → None → Drained
//!     app.handle(message)        → Err → report_worker_error + plain 500
//!     transport.respond(out)
//!     app.clean()                → true → stop_worker → Recycled
//! ```

use std::time::Instant;

use axum::http::StatusCode;

use crate::http::message::{InboundMessage, OutboundMessage};
use crate::lifecycle::Application;
use crate::observability::metrics;

/// Request source / response sink driving one worker.
pub trait Transport {
    /// Next request, or `None` once the source is exhausted.
    fn accept_request(&mut self) -> Option<InboundMessage>;

    /// Send the response for the request last accepted.
    fn respond(&mut self, message: OutboundMessage);

    /// Out-of-band error channel to the host.
    fn report_worker_error(&mut self, message: &str);

    /// The worker is about to exit.
    fn stop_worker(&mut self);
}

/// Why a worker loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The transport ran out of requests.
    Drained,
    /// Memory pressure; the host should restart the process.
    Recycled,
    /// The application could not be built, so no request was served.
    Failed,
}

/// Serve requests from `transport` until it drains or the worker must recycle.
pub fn run_worker(app: &mut Application, transport: &mut dyn Transport) -> WorkerExit {
    while let Some(message) = transport.accept_request() {
        let started = Instant::now();
        let method = message.method().to_string();

        let out = match app.handle(message) {
            Ok(out) => out,
            Err(e) => {
                transport.report_worker_error(&e.to_string());
                OutboundMessage::plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        };

        metrics::record_request(&method, out.status.as_u16(), started);
        transport.respond(out);

        if app.clean() {
            transport.stop_worker();
            return WorkerExit::Recycled;
        }
    }
    WorkerExit::Drained
}
