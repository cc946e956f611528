use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use regex::Regex;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use remote_executor::{read_host_list, Config, Pool, Printer, RunError};

/// Runs the command on every host and prints outcomes as they arrive.
/// Returns whether every host succeeded.
async fn run(cli: &Config) -> Result<bool, RunError> {
    let pattern = Regex::new(&cli.parser)?;
    let hosts = read_host_list(&cli.hostlist, &pattern, &cli.remote_port)?;
    info!(hosts = hosts.len(), "host list parsed");

    let pool = Arc::new(Pool::with_ssh(cli.pool_settings(), &cli.command, cli.ssh_options())?);
    pool.schedule_workers().await?;

    // Submission blocks once the queues are full, so it runs next to the drain.
    info!("scheduling jobs");
    let scheduler = {
        let pool = Arc::clone(&pool);
        let hosts = hosts.clone();
        tokio::spawn(async move { pool.schedule_jobs(hosts).await })
    };

    let (sink, outcomes) = flume::bounded(pool.settings().queue_capacity);
    let drain = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.stream_results(sink).await })
    };

    info!("waiting for results");
    let mut printer = Printer::new(&hosts);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let interrupted = loop {
        tokio::select! {
            outcome = outcomes.recv_async() => match outcome {
                Ok(outcome) => printer.print(&outcome)?,
                Err(_) => break false,
            },
            _ = &mut ctrl_c => {
                warn!("interrupted, not waiting for the remaining hosts");
                break true;
            }
        }
    };

    if !interrupted {
        scheduler.await??;
        drain.await??;
    }

    printer.summarize(cli.summarize, hosts.len());
    info!("exiting...");
    Ok(!interrupted && printer.failed().is_empty())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Config::parse();
    match run(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
