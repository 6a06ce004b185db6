//! `stride` - drive the task runner against a JSON store file.

mod config;
mod logging;

use std::fs;
use std::io::{self, Read as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use stride_core::app::{BuildError, TaskCounts};
use stride_core::domain::StoreError;
use stride_core::ports::TaskStore;
use stride_core::store::{JsonFileStore, StoreFile};
use stride_core::{RunnerBuilder, Task, TaskFilter, TaskId, TaskRunner, TaskSpec, TaskStatus};
use tracing::info;

use crate::config::CliConfig;

#[derive(Parser)]
#[command(name = "stride", version, about = "Persistent multi-step task runner")]
struct Cli {
    /// Config file [default: <config dir>/stride/config.toml]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Task store file [default: <config dir>/stride/tasks.json]
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Log scheduler activity.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler until Ctrl-C. Commands that change tasks are refused
    /// while it runs.
    Run,
    /// Run a single tick and exit.
    Tick,
    /// Create a task from a JSON spec file (`-` reads stdin).
    Create { file: PathBuf },
    /// List tasks in creation order.
    List {
        /// Only tasks with this status (e.g. `pending`, `in-progress`).
        #[arg(long)]
        status: Option<TaskStatus>,
    },
    /// Print one task as JSON.
    Show { id: TaskId },
    /// Cancel a task that has not finished.
    Cancel { id: TaskId },
    /// Pause a pending or running task.
    Pause { id: TaskId },
    /// Return a paused task to the queue.
    Resume { id: TaskId },
    /// Delete a finished task.
    Remove { id: TaskId },
    /// Task counts per status.
    Status,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = config::load(cli.config.as_deref())?;
    let store = JsonFileStore::new(config.resolve_store_path(cli.store)?);

    match cli.command {
        // queries read the file as is and never claim the store
        Command::List { status } => cmd_list(&store.load().await, status),
        Command::Show { id } => cmd_show(&store.load().await, id),
        Command::Status => {
            print_counts(&TaskCounts::from_tasks(&store.load().await.tasks));
            Ok(())
        }
        Command::Run => cmd_run(&open_runner(&config, store).await?).await,
        Command::Tick => cmd_tick(&*open_runner(&config, store).await?).await,
        Command::Create { file } => cmd_create(&*open_runner(&config, store).await?, &file).await,
        Command::Cancel { id } => {
            let runner = open_runner(&config, store).await?;
            report_transition("cancelled", runner.cancel_task(id).await?)
        }
        Command::Pause { id } => {
            let runner = open_runner(&config, store).await?;
            report_transition("paused", runner.pause_task(id).await?)
        }
        Command::Resume { id } => {
            let runner = open_runner(&config, store).await?;
            report_transition("resumed", runner.resume_task(id).await?)
        }
        Command::Remove { id } => {
            let runner = open_runner(&config, store).await?;
            report_transition("removed", runner.remove_task(id).await?)
        }
    }
}

/// A runner that owns `store` until it is dropped.
///
/// Fails while another process (typically `stride run`) owns the same file.
async fn open_runner(config: &CliConfig, store: JsonFileStore) -> Result<Arc<TaskRunner>> {
    let lock_path = store.lock_path();
    let built = RunnerBuilder::new()
        .config(config.runner.clone())
        .store(store)
        .executor(config.executor.build())
        .build()
        .await;

    match built {
        Ok(runner) => Ok(Arc::new(runner)),
        Err(BuildError::Store(StoreError::Locked { .. })) => bail!(
            "task store is in use by another stride process (lock file {}); stop `stride run` before changing tasks",
            lock_path.display()
        ),
        Err(err) => Err(err).context("set up task runner"),
    }
}

async fn cmd_run(runner: &Arc<TaskRunner>) -> Result<()> {
    runner.advance_all_tasks().await;
    runner.start();
    info!("running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("wait for Ctrl-C")?;
    info!("stopping");
    runner.stop().await.context("flush task store")?;
    Ok(())
}

async fn cmd_tick(runner: &TaskRunner) -> Result<()> {
    let report = runner.advance_all_tasks().await;
    runner.stop().await.context("flush task store")?;
    println!(
        "promoted {}, advanced {}, failed {}",
        report.promoted, report.advanced, report.failed
    );
    Ok(())
}

async fn cmd_create(runner: &TaskRunner, file: &Path) -> Result<()> {
    let raw = if file == Path::new("-") {
        let mut raw = String::new();
        io::stdin().read_to_string(&mut raw).context("read spec from stdin")?;
        raw
    } else {
        fs::read_to_string(file).with_context(|| format!("read spec {}", file.display()))?
    };
    let spec: TaskSpec = serde_json::from_str(&raw).context("parse task spec")?;

    let task = runner.create_task(spec).await?;
    print_json(&task)
}

fn cmd_list(store: &StoreFile, status: Option<TaskStatus>) -> Result<()> {
    let filter = TaskFilter { status };
    println!("{:<31}  {:<11}  {:>7}  NAME", "ID", "STATUS", "STEPS");
    for task in store.tasks.iter().filter(|task| filter.matches(task)) {
        println!(
            "{:<31}  {:<11}  {:>7}  {}",
            task.id.to_string(),
            task.status.as_str(),
            format!("{}/{}", task.completed_steps(), task.total_steps()),
            task.name
        );
    }
    Ok(())
}

fn cmd_show(store: &StoreFile, id: TaskId) -> Result<()> {
    let task = store
        .find_task(id)
        .with_context(|| format!("task not found: {id}"))?;
    print_json(task)
}

fn report_transition(action: &str, task: Task) -> Result<()> {
    println!("{action} {} ({})", task.id, task.status);
    Ok(())
}

fn print_counts(counts: &TaskCounts) {
    for status in TaskStatus::ALL {
        println!("{:<11}  {}", status.as_str(), counts.get(status));
    }
    println!("{:<11}  {}", "total", counts.total());
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
