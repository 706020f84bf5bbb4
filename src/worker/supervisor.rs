//! Worker supervision.
//!
//! # Responsibilities
//! - Run N worker threads over the shared job queue
//! - Build each worker's `Application` from the factory
//! - Turn a worker's recycle request into a graceful process exit
//!
//! # Design Decisions
//! - Worker threads are plain OS threads; the controller never awaits
//! - Resident memory belongs to the process, so rebuilding an `Application`
//!   in place would not lower it; a recycling worker fires the shared
//!   [`Shutdown`] and the process exits for its external supervisor to restart
//! - A factory failure stops that worker slot; the others keep serving

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::lifecycle::{Application, BuildError, Shutdown};
use crate::observability::metrics;
use crate::worker::channel::{ChannelTransport, SharedJobs};
use crate::worker::transport::{run_worker, WorkerExit};

/// Builds a fresh application for a worker.
pub type AppFactory = Arc<dyn Fn() -> Result<Application, BuildError> + Send + Sync>;

pub struct Supervisor {
    workers: usize,
    factory: AppFactory,
    jobs: SharedJobs,
    shutdown: Shutdown,
}

impl Supervisor {
    pub fn new(workers: usize, factory: AppFactory, jobs: SharedJobs, shutdown: Shutdown) -> Self {
        Self {
            workers: workers.max(1),
            factory,
            jobs,
            shutdown,
        }
    }

    /// Spawn the worker threads. They exit once the job queue closes or
    /// after asking for a recycle.
    pub fn spawn(self) -> std::io::Result<Vec<JoinHandle<WorkerExit>>> {
        (0..self.workers)
            .map(|id| {
                let factory = self.factory.clone();
                let jobs = self.jobs.clone();
                let shutdown = self.shutdown.clone();
                thread::Builder::new()
                    .name(format!("worker-{}", id))
                    .spawn(move || supervise(id, factory, jobs, shutdown))
            })
            .collect()
    }
}

fn supervise(id: usize, factory: AppFactory, jobs: SharedJobs, shutdown: Shutdown) -> WorkerExit {
    let mut app = match factory() {
        Ok(app) => app,
        Err(e) => {
            tracing::error!(worker = id, error = %e, "Failed to build application");
            return WorkerExit::Failed;
        }
    };
    metrics::worker_started();
    tracing::debug!(worker = id, "Worker ready");

    let mut transport = ChannelTransport::new(id, jobs);
    let exit = run_worker(&mut app, &mut transport);
    match exit {
        WorkerExit::Recycled => {
            metrics::record_recycle(id);
            tracing::warn!(
                worker = id,
                handled = app.handled(),
                "Worker over memory limit, shutting down for a process restart"
            );
            shutdown.trigger();
        }
        WorkerExit::Drained | WorkerExit::Failed => tracing::info!(worker = id, handled = app.handled(), "Worker drained"),
    }
    metrics::worker_stopped();
    exit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::routing::Router;
    use crate::worker::job_queue;

    #[test]
    fn factory_failure_stops_only_that_slot() {
        let factory: AppFactory = Arc::new(|| {
            let mut config = BridgeConfig::default();
            config.worker.memory_limit = "lots".to_string();
            let router = Router::from_config(&config.routing, "site/index");
            Application::builder(Arc::new(config), Arc::new(router)).build()
        });
        let (jobs_tx, jobs_rx) = job_queue(1);
        let shutdown = Shutdown::new();
        let handles = Supervisor::new(2, factory, jobs_rx, shutdown.clone())
            .spawn()
            .unwrap();
        drop(jobs_tx);

        for handle in handles {
            assert_eq!(handle.join().unwrap(), WorkerExit::Failed);
        }
        assert!(!shutdown.is_triggered());
    }
}
