//! SSH session wrapper.
//!
//! The pool only sees the [`Executor`] trait. [`SshExecutor`] is the real
//! implementation: one SSH connection per job, torn down as soon as the
//! command's output has been collected.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use openssh::{KnownHosts, SessionBuilder};
use tracing::{debug, warn};

use crate::error::HostError;
use crate::job::Execution;

/// Runs the pool's command against a single host.
///
/// Implementations may block for as long as the remote command runs. Failures
/// are reported inside the returned [`Execution`] and never stop the pool.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, host: &str) -> Execution;
}

/// Connection settings shared by every job of one run.
#[derive(Debug, Clone)]
pub struct SshOptions {
    /// Remote user. `None` lets ssh pick from its own configuration.
    pub user: Option<String>,
    /// Private key to authenticate with.
    pub private_key: Option<PathBuf>,
    /// Refuse hosts whose key is not already in known_hosts.
    pub check_host_key: bool,
    pub connect_timeout: Duration,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            user: None,
            private_key: None,
            check_host_key: true,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl SshOptions {
    fn builder(&self) -> SessionBuilder {
        let mut builder = SessionBuilder::default();
        if let Some(user) = &self.user {
            builder.user(user.clone());
        }
        if let Some(key) = &self.private_key {
            builder.keyfile(key);
        }
        builder
            .known_hosts_check(if self.check_host_key {
                KnownHosts::Strict
            } else {
                KnownHosts::Accept
            })
            .connect_timeout(self.connect_timeout);
        builder
    }
}

pub struct SshExecutor {
    command: String,
    options: SshOptions,
}

impl SshExecutor {
    pub fn new(command: impl Into<String>, options: SshOptions) -> Self {
        Self {
            command: command.into(),
            options,
        }
    }
}

#[async_trait]
impl Executor for SshExecutor {
    async fn execute(&self, host: &str) -> Execution {
        let (destination, port) = match split_host_port(host) {
            Ok(parts) => parts,
            Err(e) => return Execution::failure(Vec::new(), e),
        };

        let mut builder = self.options.builder();
        if let Some(port) = port {
            builder.port(port);
        }
        let session = match builder.connect_mux(destination).await {
            Ok(session) => session,
            Err(e) => return Execution::failure(Vec::new(), HostError::Connect(e)),
        };
        debug!(host, "connected");

        // The command line goes to the remote shell untouched.
        let result = session.raw_command(&self.command).output().await;

        if let Err(e) = session.close().await {
            warn!(host, error = %e, "error while terminating connection");
        }

        match result {
            Ok(output) => {
                let mut combined = output.stdout;
                combined.extend_from_slice(&output.stderr);
                match output.status.code() {
                    Some(0) => Execution::success(combined),
                    Some(code) => Execution::failure(combined, HostError::Exit(code)),
                    None => Execution::failure(combined, HostError::Signal),
                }
            }
            Err(e) => Execution::failure(Vec::new(), HostError::Command(e)),
        }
    }
}

/// Splits `host:port` into the ssh destination and the port, if any.
fn split_host_port(host: &str) -> Result<(&str, Option<u16>), HostError> {
    match host.rsplit_once(':') {
        None => Ok((host, None)),
        Some((name, port)) => {
            let port = port
                .parse()
                .map_err(|_| HostError::InvalidAddress(host.to_string()))?;
            // IPv6 addresses must be bracketed to carry a port.
            let name = match name.strip_prefix('[').and_then(|n| n.strip_suffix(']')) {
                Some(inner) => inner,
                None if name.contains(':') => {
                    return Err(HostError::InvalidAddress(host.to_string()))
                }
                None => name,
            };
            if name.is_empty() {
                return Err(HostError::InvalidAddress(host.to_string()));
            }
            Ok((name, Some(port)))
        }
    }
}
