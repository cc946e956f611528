//! remote-executor: run one command against many SSH hosts through a bounded
//! worker pool.

// Command line arguments and configuration.
pub mod config;
// How to parse and represent hosts.
pub mod host;
// Jobs and their outcomes.
pub mod job;
// The worker pool.
pub mod pool;
// Printing outcomes.
pub mod output;
// Synchronization primitives.
pub mod sync;
// SSH session wrapper.
pub mod session;
// Error handling.
pub mod error;

mod worker;

pub use config::Config;
pub use error::{HostError, HostListError, PoolError, RunError};
pub use host::{parse_host_list, read_host_list, with_port};
pub use job::{Execution, Outcome};
pub use output::Printer;
pub use pool::{Pool, PoolSettings};
pub use session::{Executor, SshExecutor, SshOptions};
pub use sync::WaitGroup;
pub use tokio_util::sync::CancellationToken;
