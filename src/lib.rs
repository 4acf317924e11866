// src/lib.rs

pub mod cli;
pub mod config;
pub mod context;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod tasks;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub use crate::context::{ContextFactory, TaskContext};
pub use crate::dag::{task_fn, RetryPolicy, Scheduler, Task, TaskDefinition};
pub use crate::engine::{RunConfig, Runtime, SchedulerEvent};
pub use crate::errors::DagError;
pub use crate::types::{Artifacts, NodeStatus, OutputStatus, RunState, RunStatus, TaskOutput};

use crate::cli::CliArgs;
use crate::config::{config_root_dir, load_and_validate, ConfigFile};
use crate::context::HostContextFactory;
use crate::dag::DagGraph;

/// High-level entry point used by `main.rs`.
///
/// Loads the task file, resolves the run configuration (flags override the
/// `[run]` section), runs the entry's subgraph on the host and prints the
/// result. Returns `None` for `--dry-run`.
pub async fn run(args: CliArgs) -> Result<Option<RunStatus>> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let scheduler = Scheduler::new(cfg.task_definitions()?)?;
    let entry = resolve_entry(args.entry.as_deref(), &cfg, scheduler.graph())?;
    let run_config = build_run_config(&args, &cfg, &entry)?;

    if args.dry_run {
        print_dry_run(&cfg, scheduler.graph(), &run_config)?;
        return Ok(None);
    }

    let root = config_root_dir(&config_path);
    debug!(root = %root.display(), "resolving task paths against config directory");
    let factory = HostContextFactory::new(root).with_model(cfg.model_invoker());

    let mut runtime = Runtime::from_scheduler(scheduler, Arc::new(factory));
    let reporter = (!args.json).then(|| tokio::spawn(report_progress(runtime.subscribe())));

    let status = runtime.run_until(run_config, shutdown_signal()).await?;

    // Closing the event channel lets the reporter drain and exit.
    drop(runtime);
    if let Some(reporter) = reporter {
        if let Err(e) = reporter.await {
            warn!(error = %e, "progress reporter stopped abnormally");
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_summary(&status);
    }

    Ok(Some(status))
}

/// Pick the entry task: the flag, then `[run].entry`, then the single task
/// that nothing depends on.
pub fn resolve_entry(cli_entry: Option<&str>, cfg: &ConfigFile, graph: &DagGraph) -> Result<String> {
    if let Some(entry) = cli_entry.or(cfg.run.entry.as_deref()) {
        return Ok(entry.to_string());
    }

    let sinks: Vec<&str> = graph
        .tasks()
        .filter(|id| graph.dependents_of(id).is_empty())
        .collect();

    match sinks.as_slice() {
        [only] => {
            info!(entry = %only, "no entry given; using the only final task");
            Ok(only.to_string())
        }
        _ => anyhow::bail!(
            "no entry task given and the graph has {} final tasks ({}); pass --entry or set [run].entry",
            sinks.len(),
            sinks.join(", ")
        ),
    }
}

fn build_run_config(args: &CliArgs, cfg: &ConfigFile, entry: &str) -> Result<RunConfig> {
    let mut run_config = cfg.run_config(entry)?;
    if let Some(concurrency) = args.concurrency {
        run_config.concurrency = concurrency;
    }
    if args.stop_on_error {
        run_config.stop_on_error = true;
    }
    if let Some(timeout) = args.timeout {
        run_config.timeout = Some(timeout);
    }
    run_config.validate()?;
    Ok(run_config)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C; run can only end on its own");
        std::future::pending::<()>().await;
    }
    info!("Ctrl+C received; cancelling run");
}

async fn report_progress(mut events: mpsc::UnboundedReceiver<SchedulerEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SchedulerEvent::TaskStarted { task_id, .. } => eprintln!("[start] {task_id}"),
            SchedulerEvent::TaskCompleted(output) => {
                eprintln!("[ok]    {} ({} ms)", output.task_id, output.duration_ms)
            }
            SchedulerEvent::TaskFailed(output) => eprintln!(
                "[fail]  {}: {}",
                output.task_id,
                output.error.as_deref().unwrap_or("unknown error")
            ),
            SchedulerEvent::TaskSkipped(output) => eprintln!(
                "[skip]  {}: {}",
                output.task_id,
                output.error.as_deref().unwrap_or("skipped")
            ),
            SchedulerEvent::StatusChange(_) => {}
        }
    }
}

fn print_summary(status: &RunStatus) {
    println!(
        "run {}: {} completed, {} failed, {} skipped of {} task(s)",
        status.state,
        status.completed_tasks,
        status.failed_tasks,
        status.skipped_tasks(),
        status.total_tasks
    );
    for output in status.outputs.values() {
        let detail = output.error.as_deref().unwrap_or("");
        println!(
            "  {:<8} {:<24} {:>7} ms  {}",
            format!("{:?}", output.status).to_lowercase(),
            output.task_id,
            output.duration_ms,
            detail
        );
    }
}

fn print_dry_run(cfg: &ConfigFile, graph: &DagGraph, run_config: &RunConfig) -> Result<()> {
    println!("dagrun dry-run");
    println!("  entry = {}", run_config.entry);
    println!("  concurrency = {}", run_config.concurrency);
    println!("  stop_on_error = {}", run_config.stop_on_error);
    if let Some(timeout) = run_config.timeout {
        println!("  timeout = {timeout:?}");
    }
    println!();

    println!("tasks ({}):", cfg.task.len());
    for (name, task) in &cfg.task {
        println!("  - {name}");
        println!("      {}", task.describe());
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        if let Some(model) = &task.model {
            println!("      model: {model}");
        }
        if let Some(output) = &task.output {
            println!("      output: {output}");
        }
        if task.retries > 0 {
            println!("      retries: {}", task.retries);
        }
    }
    println!();

    let subgraph = graph.subgraph_from(&run_config.entry)?;
    let order = graph.topological_order(&subgraph)?;
    println!("execution order for '{}':", run_config.entry);
    for (i, id) in order.iter().enumerate() {
        println!("  {}. {id}", i + 1);
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
