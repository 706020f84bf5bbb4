//! Channel transport between the async front server and worker threads.
//!
//! Workers share one job queue; each job carries a oneshot sender for the
//! response. The queue closes when the front server drops its sender.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, oneshot};

use crate::http::message::{InboundMessage, OutboundMessage};
use crate::worker::transport::Transport;

/// One request handed to a worker.
#[derive(Debug)]
pub struct Job {
    pub message: InboundMessage,
    pub reply: oneshot::Sender<OutboundMessage>,
}

/// Receiving half shared by every worker.
pub type SharedJobs = Arc<Mutex<mpsc::Receiver<Job>>>;

/// Create the job queue.
pub fn job_queue(capacity: usize) -> (mpsc::Sender<Job>, SharedJobs) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (tx, Arc::new(Mutex::new(rx)))
}

/// Blocking transport over the shared queue. Use from a worker thread only.
pub struct ChannelTransport {
    worker: usize,
    jobs: SharedJobs,
    pending: Option<oneshot::Sender<OutboundMessage>>,
}

impl ChannelTransport {
    pub fn new(worker: usize, jobs: SharedJobs) -> Self {
        Self {
            worker,
            jobs,
            pending: None,
        }
    }
}

impl Transport for ChannelTransport {
    fn accept_request(&mut self) -> Option<InboundMessage> {
        let job = {
            let mut rx = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
            rx.blocking_recv()
        }?;
        self.pending = Some(job.reply);
        Some(job.message)
    }

    fn respond(&mut self, message: OutboundMessage) {
        match self.pending.take() {
            Some(reply) => {
                if reply.send(message).is_err() {
                    tracing::debug!(worker = self.worker, "Client went away before the response");
                }
            }
            None => tracing::warn!(worker = self.worker, "Response without a pending request"),
        }
    }

    fn report_worker_error(&mut self, message: &str) {
        tracing::error!(worker = self.worker, error = %message, "Worker error");
    }

    fn stop_worker(&mut self) {
        tracing::info!(worker = self.worker, "Worker stopping");
    }
}
