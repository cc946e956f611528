use thiserror::Error;

/// Failures of the pool itself. Per-host failures never show up here; they are
/// carried inside [`crate::Outcome`] as a [`HostError`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),
    #[error("Job was cancelled by the caller")]
    Cancelled,
    #[error("Job queue is closed; no more jobs can be submitted")]
    JobQueueClosed,
    #[error("Pool results were already drained; only one drain call is allowed per pool")]
    AlreadyDrained,
    #[error("Worker dropped the job without reporting an outcome")]
    WorkerLost,
}

impl PoolError {
    /// Whether the caller gave up, as opposed to the pool failing.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PoolError::Cancelled)
    }
}

/// Why running the command against one host failed.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("could not dial: {0}")]
    Connect(#[source] openssh::Error),
    #[error("unable to run command: {0}")]
    Command(#[source] openssh::Error),
    #[error("Process exited with status {0}")]
    Exit(i32),
    #[error("Process terminated by a signal")]
    Signal,
    #[error("Invalid host address '{0}'")]
    InvalidAddress(String),
    #[error("Executor panicked: {0}")]
    Panicked(String),
}

#[derive(Error, Debug)]
pub enum HostListError {
    #[error("unable to open host list file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read host list: {0}")]
    Read(#[from] std::io::Error),
}

/// Anything that ends a command line run early.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Invalid host list parser: {0}")]
    Pattern(#[from] regex::Error),
    #[error(transparent)]
    HostList(#[from] HostListError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
