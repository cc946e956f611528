use std::fmt::Debug;

use tokio::sync::oneshot;

use crate::error::HostError;

/// What an [`crate::Executor`] produced for one host.
#[derive(Debug)]
pub struct Execution {
    /// Combined stdout and stderr. May be non-empty even when `error` is set.
    pub output: Vec<u8>,
    pub error: Option<HostError>,
}

impl Execution {
    pub fn success(output: impl Into<Vec<u8>>) -> Self {
        Self {
            output: output.into(),
            error: None,
        }
    }

    pub fn failure(output: impl Into<Vec<u8>>, error: HostError) -> Self {
        Self {
            output: output.into(),
            error: Some(error),
        }
    }
}

/// The result of running the command against one host.
pub struct Outcome {
    pub host: String,
    pub output: Vec<u8>,
    pub error: Option<HostError>,
}

impl Outcome {
    pub fn new(host: String, execution: Execution) -> Self {
        Self {
            host,
            output: execution.output,
            error: execution.error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl Debug for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error {
            None => write!(f, "{} ok ({} bytes)", self.host, self.output.len()),
            Some(error) => write!(
                f,
                "{} failed ({} bytes): {}",
                self.host,
                self.output.len(),
                error
            ),
        }
    }
}

/// One unit of work sitting in the job queue.
///
/// Bulk jobs only carry the host; their outcome goes to the pool's result queue.
/// Jobs submitted through [`crate::Pool::run_job`] also carry a single-use reply
/// channel, so the outcome is handed to the waiting caller instead.
pub(crate) struct Job {
    pub host: String,
    pub reply: Option<oneshot::Sender<Outcome>>,
}

impl Job {
    pub fn bulk(host: String) -> Self {
        Self { host, reply: None }
    }

    pub fn with_reply(host: String) -> (Self, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                host,
                reply: Some(tx),
            },
            rx,
        )
    }
}
