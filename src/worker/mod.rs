//! Worker host subsystem.
//!
//! # Data Flow
//! ```text
//! HttpServer (async) ──Job──▶ shared queue ──▶ worker-N thread
//!                                               └─ run_worker(Application, ChannelTransport)
//!                  ◀──oneshot(OutboundMessage)──┘
//! Recycled → supervisor fires Shutdown; the process drains and exits
//! Drained  → thread exits
//! ```

pub mod channel;
pub mod supervisor;
pub mod transport;

pub use channel::{job_queue, ChannelTransport, Job, SharedJobs};
pub use supervisor::{AppFactory, Supervisor};
pub use transport::{run_worker, Transport, WorkerExit};
