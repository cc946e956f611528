use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, warn};

use crate::error::HostError;
use crate::job::{Execution, Job, Outcome};
use crate::session::Executor;
use crate::sync::WaitGuard;

/// A long-lived task serving the pool's job queue.
///
/// Workers are interchangeable: each one takes whatever job comes next, runs it,
/// and hands the outcome back. Nothing is kept between jobs.
pub(crate) struct Worker {
    pub id: usize,
    pub jobs: flume::Receiver<Job>,
    pub results: flume::Sender<Outcome>,
    pub executor: Arc<dyn Executor>,
    /// Outcomes computed for callers that had already given up.
    pub abandoned: Arc<AtomicUsize>,
}

impl Worker {
    /// Serves jobs until the queue is closed and empty. The guard is released
    /// when this returns, telling the pool one fewer worker is alive.
    pub async fn run(self, _guard: WaitGuard) {
        while let Ok(job) = self.jobs.recv_async().await {
            // A panicking executor fails its host, not the worker.
            let execution = match AssertUnwindSafe(self.executor.execute(&job.host))
                .catch_unwind()
                .await
            {
                Ok(execution) => execution,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(worker = self.id, host = %job.host, %message, "executor panicked");
                    Execution::failure(Vec::new(), HostError::Panicked(message))
                }
            };
            let outcome = Outcome::new(job.host, execution);
            match job.reply {
                Some(reply) => {
                    if let Err(outcome) = reply.send(outcome) {
                        // The caller was cancelled while we were running.
                        self.abandoned.fetch_add(1, Ordering::Relaxed);
                        debug!(worker = self.id, host = %outcome.host, "caller gone, discarding outcome");
                    }
                }
                None => {
                    if let Err(flume::SendError(outcome)) = self.results.send_async(outcome).await {
                        warn!(worker = self.id, host = %outcome.host, "result queue closed, dropping outcome");
                    }
                }
            }
        }
        debug!(worker = self.id, "job queue drained, exiting");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
