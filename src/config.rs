//! Configuration for remote-executor.
//!
//! Holds the clap struct for command line arguments and flags, and turns it
//! into the settings the pool and the SSH executor need.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::host::DEFAULT_HOST_PATTERN;
use crate::pool::PoolSettings;
use crate::session::SshOptions;

#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Config {
    /// File listing the hosts to run the command on
    pub hostlist: String,

    /// Command to run on every host
    pub command: String,

    /// Size of the worker pool
    #[arg(long, default_value_t = 100)]
    pub concurrency: usize,

    /// Capacity of the job and result queues. Defaults to twice the concurrency
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Check the remote host key against known_hosts
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub check_hostkey: bool,

    /// Regex used to parse the host list. The first capture group is the host
    #[arg(long, default_value = DEFAULT_HOST_PATTERN)]
    pub parser: String,

    /// Remote user. Defaults to $USER
    #[arg(long)]
    pub user: Option<String>,

    /// SSH private key to use. Defaults to $HOME/.ssh/id_rsa
    #[arg(long)]
    pub private_key: Option<PathBuf>,

    /// Remote server's SSH port, used for hosts that don't name one
    #[arg(long, default_value = "22")]
    pub remote_port: String,

    /// Seconds to wait for a connection to be established
    #[arg(long, default_value_t = 10)]
    pub connect_timeout: u64,

    /// Report failed hosts at the end of the run
    #[arg(long)]
    pub summarize: bool,
}

impl Config {
    pub fn pool_settings(&self) -> PoolSettings {
        let settings = PoolSettings::new(self.concurrency);
        match self.queue_capacity {
            Some(capacity) => settings.with_queue_capacity(capacity),
            None => settings,
        }
    }

    pub fn ssh_options(&self) -> SshOptions {
        let user = self
            .user
            .clone()
            .or_else(|| std::env::var("USER").ok());
        let private_key = self.private_key.clone().or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|home| PathBuf::from(home).join(".ssh").join("id_rsa"))
        });
        SshOptions {
            user,
            private_key,
            check_host_key: self.check_hostkey,
            connect_timeout: Duration::from_secs(self.connect_timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse_from(["remote-executor", "hosts.list", "uptime"]);
        assert_eq!(config.hostlist, "hosts.list");
        assert_eq!(config.command, "uptime");
        assert_eq!(config.concurrency, 100);
        assert!(config.check_hostkey);
        assert_eq!(config.parser, DEFAULT_HOST_PATTERN);
        assert_eq!(config.remote_port, "22");
        assert!(!config.summarize);
        assert_eq!(
            config.pool_settings(),
            PoolSettings {
                workers: 100,
                queue_capacity: 200
            }
        );
    }

    #[test]
    fn test_overrides() {
        let config = Config::parse_from([
            "remote-executor",
            "--concurrency=5",
            "--queue-capacity=1",
            "--check-hostkey=false",
            "--user=deploy",
            "--private-key=/tmp/key",
            "--connect-timeout=3",
            "hosts.list",
            "uname -a",
        ]);
        assert_eq!(
            config.pool_settings(),
            PoolSettings {
                workers: 5,
                queue_capacity: 1
            }
        );
        let options = config.ssh_options();
        assert_eq!(options.user.as_deref(), Some("deploy"));
        assert_eq!(options.private_key, Some(PathBuf::from("/tmp/key")));
        assert!(!options.check_host_key);
        assert_eq!(options.connect_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_missing_command_is_rejected() {
        assert!(Config::try_parse_from(["remote-executor", "hosts.list"]).is_err());
    }
}
