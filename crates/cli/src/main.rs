mod cli;
mod report;
mod simulated;
mod workload;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use taskmill_core::{load_dotenv, SchedulerConfig};
use taskmill_scheduler::{Executor, Scheduler, SchedulerEvent, TaskFilter, TaskStatus};

use crate::cli::{CliArgs, Command, RunArgs};
use crate::report::Report;
use crate::simulated::SimulatedExecutor;
use crate::workload::Workload;

/// How often the runner checks whether the workload has settled.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    load_dotenv();
    let args = CliArgs::parse();
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Config => {
            let rendered = toml::to_string_pretty(&config).context("failed to render config")?;
            println!("{rendered}");
            Ok(())
        }
        Command::Run(run_args) => run(config, run_args).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<SchedulerConfig> {
    match path {
        Some(path) => SchedulerConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => SchedulerConfig::from_env().context("invalid configuration in environment"),
    }
}

async fn run(mut config: SchedulerConfig, args: RunArgs) -> Result<()> {
    if let Some(strategy) = args.strategy {
        config.strategy = strategy;
    }
    config.log_summary();

    let workload = Workload::from_file(&args.workload)?;
    info!(
        queues = workload.queues.len(),
        tasks = workload.tasks.len(),
        "Loaded workload {}",
        args.workload.display()
    );

    let executor: Arc<dyn Executor> = Arc::new(SimulatedExecutor::new(args.time_scale));
    let scheduler = Scheduler::new(config).with_executors([executor])?;

    for queue in &workload.queues {
        let name = queue.name.clone().unwrap_or_else(|| queue.id.clone());
        if !scheduler.create_queue(&queue.id, name, queue.concurrency, queue.priority) {
            warn!(queue = %queue.id, "Queue defined twice, keeping the first");
            continue;
        }
        if queue.paused {
            scheduler.pause_queue(&queue.id);
        }
    }

    let event_counts = Arc::new(Mutex::new(BTreeMap::new()));
    let logger = spawn_event_logger(&scheduler, Arc::clone(&event_counts));

    scheduler.start()?;
    let now = Utc::now();
    for def in &workload.tasks {
        scheduler
            .add_task(def.to_spec(now))
            .with_context(|| format!("failed to add task '{}'", def.id))?;
    }

    let timeout = Duration::from_secs(args.timeout_secs);
    if tokio::time::timeout(timeout, wait_until_settled(&scheduler))
        .await
        .is_err()
    {
        warn!(timeout_secs = args.timeout_secs, "Workload did not settle before timeout");
    }

    scheduler.stop()?;
    logger.abort();

    let events = event_counts
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    let report = Report::new(
        scheduler.get_metrics(),
        scheduler.get_tasks(&TaskFilter::default()),
        events,
    );
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report.print_summary();
    }
    Ok(())
}

/// Resolves once nothing can make further progress: no task is scheduled,
/// running or waiting out a backoff. Pending tasks left behind are blocked
/// on a dependency that will never complete.
async fn wait_until_settled(scheduler: &Scheduler) {
    let active = TaskFilter::status([
        TaskStatus::Scheduled,
        TaskStatus::Running,
        TaskStatus::Retrying,
    ]);
    loop {
        if scheduler.get_tasks(&active).is_empty() {
            return;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn spawn_event_logger(
    scheduler: &Scheduler,
    counts: Arc<Mutex<BTreeMap<String, usize>>>,
) -> JoinHandle<()> {
    let mut rx = scheduler.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let SchedulerEvent::MetricsUpdated { metrics } = &event {
                        info!(
                            running = metrics.running,
                            completed = metrics.completed,
                            failed = metrics.failed,
                            success_rate = metrics.success_rate,
                            "Progress"
                        );
                    } else {
                        debug!(event = event.kind(), task_id = event.task_id().unwrap_or("-"), "Event");
                    }
                    *counts
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .entry(event.kind().to_string())
                        .or_default() += 1;
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event log fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}
