//! scheduler-worker: runs one scheduling loop per configured client.
//!
//! Dispatches through the logging dispatcher, feeds its completion notices
//! back as usage reports, and drains every loop on Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use fairsched_core::{load_dotenv, SchedulingConfig, Task};
use fairsched_scheduler::{LoggingDispatcher, LoopReport, SchedulerHandle, SchedulerLoop, UsageReporter};
use fairsched_strategy::StrategyRegistry;

// ── CLI ─────────────────────────────────────────────────────────────

/// Multi-tenant scheduler worker.
#[derive(Parser, Debug)]
#[command(name = "scheduler-worker", version, about)]
struct Cli {
    /// Path to the scheduling TOML config.
    #[arg(long, env = "FAIRSCHED_CONFIG", default_value = "config/scheduling.toml")]
    config: String,

    /// Client to submit `--tasks` to. Optional when only one client is configured.
    #[arg(long, env = "FAIRSCHED_CLIENT")]
    client: Option<String>,

    /// JSON file holding an array of tasks to submit at startup.
    #[arg(long)]
    tasks: Option<String>,

    /// Seconds to wait for each loop to drain on shutdown.
    #[arg(long, env = "FAIRSCHED_SHUTDOWN_TIMEOUT", default_value_t = 30)]
    shutdown_timeout: u64,
}

struct RunningClient {
    handle: SchedulerHandle,
    runner: JoinHandle<LoopReport>,
}

fn load_tasks(path: &str) -> anyhow::Result<Vec<Task>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading tasks from {path}"))?;
    serde_json::from_str(&content).with_context(|| format!("parsing tasks in {path}"))
}

fn submit_target<'a>(
    cli_client: Option<&'a str>,
    running: &'a [RunningClient],
) -> anyhow::Result<&'a RunningClient> {
    match cli_client {
        Some(name) => running
            .iter()
            .find(|c| c.handle.client() == name)
            .with_context(|| format!("unknown client '{name}'")),
        None if running.len() == 1 => Ok(&running[0]),
        None => bail!("--client is required when more than one client is configured"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = SchedulingConfig::from_file(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config))?;
    config.log_summary();

    // One registry for every loop, so fairness usage is shared across clients.
    let registry = StrategyRegistry::with_defaults(&config);

    let mut names: Vec<&String> = config.clients.keys().collect();
    names.sort();
    if names.is_empty() {
        warn!(path = %cli.config, "no clients configured");
    }

    let mut running = Vec::with_capacity(names.len());
    for name in names {
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let dispatcher = Arc::new(LoggingDispatcher::with_notices(notice_tx));
        let (scheduler, handle) = SchedulerLoop::new(name, &config, &registry, dispatcher)?;

        UsageReporter::new(handle.clone()).spawn_forwarder(notice_rx);
        let runner = tokio::spawn(scheduler.run());
        running.push(RunningClient { handle, runner });
    }

    if let Some(path) = &cli.tasks {
        let tasks = load_tasks(path)?;
        let target = submit_target(cli.client.as_deref(), &running)?;
        info!(client = %target.handle.client(), count = tasks.len(), "submitting tasks");
        target.handle.submit_tasks(tasks)?;
    }

    info!(clients = running.len(), "scheduler-worker started");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    for client in &running {
        client.handle.cancel();
    }

    let timeout = Duration::from_secs(cli.shutdown_timeout);
    for RunningClient { handle, runner } in running {
        match tokio::time::timeout(timeout, runner).await {
            Ok(Ok(report)) => info!(
                client = %report.client,
                dispatched = report.dispatched,
                failed = report.failed,
                remaining = report.remaining,
                "loop drained"
            ),
            Ok(Err(e)) => error!(client = %handle.client(), error = %e, "loop task failed"),
            Err(_) => warn!(client = %handle.client(), "loop did not drain before timeout"),
        }
    }

    info!("scheduler-worker exited cleanly");
    Ok(())
}
