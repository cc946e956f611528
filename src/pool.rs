//! Bounded worker pool.
//!
//! A fixed number of workers share one job queue. Outcomes of bulk jobs flow
//! into a single result queue that exactly one drain call consumes:
//!
//! ```ignore
//! let pool = Pool::create(PoolSettings::new(100), executor)?;
//! pool.schedule_workers().await?;
//! let (scheduled, outcomes) =
//!     tokio::join!(pool.schedule_jobs(hosts), pool.wait_and_return_results());
//! ```
//!
//! Jobs can also be run one at a time with [`Pool::run_job`], which waits for
//! that job's outcome and can be cancelled.
//!
//! Both queues are bounded. A producer pushing more jobs than the queues can
//! hold blocks until a drain call makes room, so bulk submission and draining
//! must run concurrently (join them, or spawn the submission).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::PoolError;
use crate::job::{Job, Outcome};
use crate::session::{Executor, SshExecutor, SshOptions};
use crate::sync::WaitGroup;
use crate::worker::Worker;

/// Size of the pool. Fixed for the pool's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Number of workers, i.e. how many hosts are worked on at once.
    pub workers: usize,
    /// Capacity of both the job and result queues. Zero makes them rendezvous
    /// channels.
    pub queue_capacity: usize,
}

impl PoolSettings {
    /// `workers` workers with queues twice that deep.
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            queue_capacity: workers.saturating_mul(2),
        }
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }
}

pub struct Pool {
    settings: PoolSettings,
    executor: Arc<dyn Executor>,
    /// `None` once the job queue is closed.
    jobs_tx: Mutex<Option<flume::Sender<Job>>>,
    jobs_rx: flume::Receiver<Job>,
    /// The pool's own handle on the result queue. Workers hold clones; the queue
    /// closes when the teardown watcher drops this one after every worker exited.
    results_tx: Arc<Mutex<Option<flume::Sender<Outcome>>>>,
    results_rx: Mutex<Option<flume::Receiver<Outcome>>>,
    workers: WaitGroup,
    torn_down: AtomicBool,
    abandoned: Arc<AtomicUsize>,
}

impl Pool {
    /// Creates the queues. No worker runs until [`Pool::schedule_workers`].
    pub fn create(settings: PoolSettings, executor: Arc<dyn Executor>) -> Result<Self, PoolError> {
        if settings.workers == 0 {
            return Err(PoolError::InvalidConfig(
                "pool needs at least one worker".to_string(),
            ));
        }
        let (jobs_tx, jobs_rx) = flume::bounded(settings.queue_capacity);
        let (results_tx, results_rx) = flume::bounded(settings.queue_capacity);
        Ok(Self {
            settings,
            executor,
            jobs_tx: Mutex::new(Some(jobs_tx)),
            jobs_rx,
            results_tx: Arc::new(Mutex::new(Some(results_tx))),
            results_rx: Mutex::new(Some(results_rx)),
            workers: WaitGroup::new(),
            torn_down: AtomicBool::new(false),
            abandoned: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// A pool that runs `command` over SSH on every host.
    pub fn with_ssh(
        settings: PoolSettings,
        command: impl Into<String>,
        options: SshOptions,
    ) -> Result<Self, PoolError> {
        Self::create(settings, Arc::new(SshExecutor::new(command, options)))
    }

    pub fn settings(&self) -> PoolSettings {
        self.settings
    }

    /// Number of workers currently alive.
    pub fn live_workers(&self) -> usize {
        self.workers.count()
    }

    /// Outcomes that were computed for [`Pool::run_job`] callers who had
    /// already been cancelled. Those outcomes are dropped.
    pub fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::Relaxed)
    }

    /// Spawns the workers. Must run inside a tokio runtime.
    ///
    /// Calling this twice spawns twice as many workers on the same queues.
    /// Fails once a drain call has started, since the result queue is then on
    /// its way to being closed.
    pub async fn schedule_workers(&self) -> Result<(), PoolError> {
        if self.torn_down.load(Ordering::Acquire) {
            return Err(PoolError::AlreadyDrained);
        }
        let results = self
            .results_tx
            .lock()
            .await
            .clone()
            .ok_or(PoolError::AlreadyDrained)?;

        info!(workers = self.settings.workers, "queueing workers");
        for id in 0..self.settings.workers {
            // Registered before the task exists, so a concurrent drain can't
            // observe zero workers and close the result queue early.
            let guard = self.workers.add();
            let worker = Worker {
                id,
                jobs: self.jobs_rx.clone(),
                results: results.clone(),
                executor: Arc::clone(&self.executor),
                abandoned: Arc::clone(&self.abandoned),
            };
            tokio::spawn(worker.run(guard));
        }
        Ok(())
    }

    /// Submits one job per host, in order, then closes the job queue.
    ///
    /// Blocks while the job queue is full, so run it concurrently with a drain
    /// call when there are more hosts than the queues can buffer.
    pub async fn schedule_jobs<I>(&self, hosts: I) -> Result<(), PoolError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let jobs = self
            .jobs_tx
            .lock()
            .await
            .take()
            .ok_or(PoolError::JobQueueClosed)?;

        let mut scheduled = 0usize;
        for host in hosts {
            jobs.send_async(Job::bulk(host.into()))
                .await
                .map_err(|_| PoolError::JobQueueClosed)?;
            scheduled += 1;
        }
        info!(jobs = scheduled, "all jobs scheduled, closing job queue");
        Ok(())
    }

    /// Closes the job queue without submitting anything. Workers exit once the
    /// jobs already queued are done.
    pub async fn close_jobs(&self) -> Result<(), PoolError> {
        self.jobs_tx
            .lock()
            .await
            .take()
            .map(drop)
            .ok_or(PoolError::JobQueueClosed)
    }

    /// Runs the command on one host and waits for its outcome.
    ///
    /// Cancellation is checked before the job is queued and again while waiting
    /// for it to finish. A cancelled call returns [`PoolError::Cancelled`] right
    /// away. If the job had already been queued, a worker still runs it to
    /// completion and its outcome is discarded (see [`Pool::abandoned`]).
    ///
    /// A failure on the host itself is not an error here; it is reported in
    /// [`Outcome::error`].
    pub async fn run_job(
        &self,
        cancel: &CancellationToken,
        host: impl Into<String>,
    ) -> Result<Outcome, PoolError> {
        if cancel.is_cancelled() {
            return Err(PoolError::Cancelled);
        }
        let jobs = self
            .jobs_tx
            .lock()
            .await
            .clone()
            .ok_or(PoolError::JobQueueClosed)?;

        let (job, reply) = Job::with_reply(host.into());
        // Dropping an unfinished send takes the job back out of the queue.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PoolError::Cancelled),
            sent = jobs.send_async(job) => sent.map_err(|_| PoolError::JobQueueClosed)?,
        }
        drop(jobs);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PoolError::Cancelled),
            outcome = reply => outcome.map_err(|_| PoolError::WorkerLost),
        }
    }

    /// Runs [`Pool::run_job`] for every host with at most `limit` calls waiting
    /// at once. Results come back in the order the hosts were given.
    ///
    /// This only bounds the caller's side; how many hosts are worked on at the
    /// same time is still decided by the number of workers.
    pub async fn run_all<I>(
        self: &Arc<Self>,
        cancel: &CancellationToken,
        hosts: I,
        limit: usize,
    ) -> Vec<(String, Result<Outcome, PoolError>)>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let semaphore = Arc::new(Semaphore::new(limit.max(1)));
        let mut handles = vec![];
        for host in hosts {
            let host: String = host.into();
            // Once cancelled, the remaining hosts are not held back; each
            // call returns `Cancelled` straight away.
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let pool = Arc::clone(self);
            let cancel = cancel.clone();
            let job_host = host.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                pool.run_job(&cancel, job_host).await
            });
            handles.push((host, handle));
        }

        let (hosts, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        hosts
            .into_iter()
            .zip(join_all(handles).await)
            .map(|(host, joined)| (host, joined.unwrap_or(Err(PoolError::WorkerLost))))
            .collect()
    }

    /// Drains the result queue and throws every outcome away.
    pub async fn wait(&self) -> Result<(), PoolError> {
        let results = self.begin_drain().await?;
        while results.recv_async().await.is_ok() {}
        Ok(())
    }

    /// Drains the result queue and returns every outcome in arrival order.
    pub async fn wait_and_return_results(&self) -> Result<Vec<Outcome>, PoolError> {
        let results = self.begin_drain().await?;
        let mut outcomes = Vec::new();
        while let Ok(outcome) = results.recv_async().await {
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Forwards every outcome to `sink` as it arrives, then closes `sink` by
    /// dropping it.
    ///
    /// If the receiving end of `sink` goes away, the remaining outcomes are
    /// still drained (and dropped) so that workers never block.
    pub async fn stream_results(&self, sink: flume::Sender<Outcome>) -> Result<(), PoolError> {
        let results = self.begin_drain().await?;
        let mut sink = Some(sink);
        while let Ok(outcome) = results.recv_async().await {
            let closed = match &sink {
                Some(tx) => tx.send_async(outcome).await.is_err(),
                None => false,
            };
            if closed {
                debug!("result sink closed, discarding remaining outcomes");
                sink = None;
            }
        }
        Ok(())
    }

    /// Claims the result queue for a single drain call and starts the watcher
    /// that closes it once all workers are gone.
    async fn begin_drain(&self) -> Result<flume::Receiver<Outcome>, PoolError> {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return Err(PoolError::AlreadyDrained);
        }
        let results = self
            .results_rx
            .lock()
            .await
            .take()
            .ok_or(PoolError::AlreadyDrained)?;

        let workers = self.workers.clone();
        let results_tx = Arc::clone(&self.results_tx);
        tokio::spawn(async move {
            workers.wait().await;
            results_tx.lock().await.take();
            debug!("all workers exited, result queue closed");
        });
        Ok(results)
    }
}
