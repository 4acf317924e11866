// src/engine/runtime.rs

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::{Id as JoinId, JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::context::{ContextFactory, HostContextFactory};
use crate::dag::{Dispatch, Scheduler, TaskDefinition};
use crate::errors::Result;
use crate::exec::run_task;
use crate::exec::runner::elapsed_ms;
use crate::types::{NodeStatus, RunStatus, TaskOutput};

use super::events::{EventBus, SchedulerEvent};
use super::RunConfig;

/// Recorded on tasks that never ran because their dependencies never
/// became ready.
pub const NEVER_READY: &str = "not run: dependencies never became ready";
/// Recorded on tasks left undispatched by `stop_on_error`.
pub const STOPPED_ON_ERROR: &str = "not run: run stopped after a task failure";
pub const RUN_TIMED_OUT: &str = "run timed out";
pub const RUN_CANCELLED: &str = "run cancelled";

/// Why dispatching stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    /// `stop_on_error`: in-flight work is allowed to finish.
    StopOnError,
    /// Overall timeout: in-flight work is aborted.
    TimedOut,
    /// Shutdown signal: in-flight work is aborted.
    Cancelled,
}

impl Halt {
    fn aborts_in_flight(self) -> bool {
        !matches!(self, Halt::StopOnError)
    }

    fn reason(self) -> &'static str {
        match self {
            Halt::StopOnError => STOPPED_ON_ERROR,
            Halt::TimedOut => RUN_TIMED_OUT,
            Halt::Cancelled => RUN_CANCELLED,
        }
    }
}

/// What woke the coordinating loop.
enum Wake {
    Joined(Option<std::result::Result<(JoinId, TaskOutput), JoinError>>),
    Halt(Halt),
}

/// Bookkeeping for an in-flight task, so aborted or panicked workers can
/// still be mapped back to their node.
struct Launched {
    task_id: String,
    started_at: DateTime<Utc>,
    start: std::time::Instant,
}

/// Drives the scheduler core: dispatches ready tasks onto Tokio workers up to
/// the concurrency budget and records their outcomes.
///
/// One coordinating loop owns all scheduler state; task bodies only see the
/// [`crate::context::TaskContext`] they are handed. A single `Runtime` can be
/// run any number of times, against the same or different entry tasks.
pub struct Runtime {
    scheduler: Scheduler,
    factory: Arc<dyn ContextFactory>,
    events: EventBus,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("scheduler", &self.scheduler)
            .field("subscribers", &self.events.subscriber_count())
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// Build and validate the task graph.
    ///
    /// Configuration errors (duplicate id, unknown dependency, cycle) are
    /// returned here and no runtime is created.
    pub fn new(definitions: Vec<TaskDefinition>, factory: Arc<dyn ContextFactory>) -> Result<Self> {
        let scheduler = Scheduler::new(definitions)?;
        Ok(Self::from_scheduler(scheduler, factory))
    }

    /// Same as [`Runtime::new`] with a [`HostContextFactory`] rooted at the
    /// current directory.
    pub fn with_host(definitions: Vec<TaskDefinition>) -> Result<Self> {
        Self::new(definitions, Arc::new(HostContextFactory::default()))
    }

    pub fn from_scheduler(scheduler: Scheduler, factory: Arc<dyn ContextFactory>) -> Self {
        Self {
            scheduler,
            factory,
            events: EventBus::new(),
        }
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SchedulerEvent> {
        self.events.subscribe()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Status of a node after (or between) runs.
    pub fn node_state(&self, task: &str) -> Option<NodeStatus> {
        self.scheduler.status_of(task)
    }

    /// Execute the dependency closure of `config.entry`.
    ///
    /// Only invalid run configuration (zero concurrency, unknown entry) is
    /// returned as an error; task failures are reported in the returned
    /// [`RunStatus`].
    pub async fn run(&mut self, config: RunConfig) -> Result<RunStatus> {
        self.run_until(config, std::future::pending::<()>()).await
    }

    /// Like [`Runtime::run`], but stops early when `shutdown` resolves.
    ///
    /// In-flight tasks are aborted and recorded as failed with
    /// `"run cancelled"`; everything that did not run is skipped.
    pub async fn run_until<F>(&mut self, config: RunConfig, shutdown: F) -> Result<RunStatus>
    where
        F: Future<Output = ()>,
    {
        config.validate()?;
        let run_id = self.scheduler.start_run(&config.entry)?;
        info!(
            run_id,
            entry = %config.entry,
            concurrency = config.concurrency,
            stop_on_error = config.stop_on_error,
            "run started"
        );
        self.emit_status();

        let deadline = config.timeout.map(|t| Instant::now() + t);
        let mut in_flight: JoinSet<TaskOutput> = JoinSet::new();
        let mut launched: HashMap<JoinId, Launched> = HashMap::new();
        let mut halt: Option<Halt> = None;
        tokio::pin!(shutdown);

        loop {
            // a. ready-set computation (and skip propagation)
            let step = self.scheduler.step();
            self.publish_skips(step.newly_skipped);

            if halt.is_none() && config.stop_on_error && self.scheduler.has_failures() {
                info!(run_id, "stop_on_error: not dispatching any further tasks");
                halt = Some(Halt::StopOnError);
            }

            // b. dispatch up to the concurrency budget
            if halt.is_none() {
                while in_flight.len() < config.concurrency {
                    let Some(task) = self.scheduler.next_ready() else {
                        break;
                    };
                    self.dispatch(&task, &mut in_flight, &mut launched);
                }
            }

            // c. nothing in flight: nothing more can happen in this run
            if in_flight.is_empty() {
                break;
            }

            let can_interrupt = halt.is_none_or(|h| !h.aborts_in_flight());
            let wake = tokio::select! {
                joined = in_flight.join_next_with_id() => Wake::Joined(joined),
                _ = &mut shutdown, if can_interrupt => Wake::Halt(Halt::Cancelled),
                _ = wait_deadline(deadline), if can_interrupt => Wake::Halt(Halt::TimedOut),
            };

            match wake {
                Wake::Joined(joined) => self.handle_joined(joined, &mut launched, halt),
                Wake::Halt(reason) => {
                    warn!(
                        run_id,
                        in_flight = in_flight.len(),
                        reason = reason.reason(),
                        "aborting in-flight tasks"
                    );
                    halt = Some(reason);
                    in_flight.abort_all();
                }
            }
        }

        // Sweep: every node of the subgraph ends terminal.
        let reason = halt.map_or(NEVER_READY, Halt::reason);
        let swept = self.scheduler.sweep(reason);
        self.publish_skips(swept);

        let status = self.scheduler.finish();
        info!(
            run_id,
            state = %status.state,
            total = status.total_tasks,
            completed = status.completed_tasks,
            failed = status.failed_tasks,
            "run finished"
        );
        self.events.emit(SchedulerEvent::StatusChange(status.clone()));
        Ok(status)
    }

    fn dispatch(
        &mut self,
        task: &str,
        in_flight: &mut JoinSet<TaskOutput>,
        launched: &mut HashMap<JoinId, Launched>,
    ) {
        let Some(Dispatch {
            definition,
            dependencies,
        }) = self.scheduler.mark_running(task)
        else {
            return;
        };

        let ctx = self.factory.create(task, dependencies);
        let started_at = Utc::now();

        debug!(task, in_flight = in_flight.len() + 1, "dispatching task");
        let handle = in_flight.spawn(run_task(definition, ctx));
        launched.insert(
            handle.id(),
            Launched {
                task_id: task.to_string(),
                started_at,
                start: std::time::Instant::now(),
            },
        );

        self.events.emit(SchedulerEvent::TaskStarted {
            task_id: task.to_string(),
            started_at,
        });
        self.emit_status();
    }

    fn handle_joined(
        &mut self,
        joined: Option<std::result::Result<(JoinId, TaskOutput), JoinError>>,
        launched: &mut HashMap<JoinId, Launched>,
        halt: Option<Halt>,
    ) {
        let output = match joined {
            None => return,
            Some(Ok((id, output))) => {
                launched.remove(&id);
                output
            }
            Some(Err(err)) => {
                let Some(task) = launched.remove(&err.id()) else {
                    warn!(error = %err, "join error for an unknown worker; ignoring");
                    return;
                };
                let message = if err.is_cancelled() {
                    halt.map_or("task cancelled", Halt::reason).to_string()
                } else if err.is_panic() {
                    panic_message(err.into_panic())
                } else {
                    err.to_string()
                };
                warn!(task = %task.task_id, error = %message, "task worker did not finish normally");
                TaskOutput::failed(
                    task.task_id,
                    message,
                    task.started_at,
                    elapsed_ms(task.start),
                    1,
                )
            }
        };

        let event_output = output.clone();
        match self.scheduler.complete(output) {
            Some(NodeStatus::Completed) => {
                self.events.emit(SchedulerEvent::TaskCompleted(event_output));
            }
            Some(_) => {
                self.events.emit(SchedulerEvent::TaskFailed(event_output));
            }
            None => return,
        }
        self.emit_status();
    }

    fn publish_skips(&mut self, skipped: Vec<TaskOutput>) {
        if skipped.is_empty() {
            return;
        }
        for output in skipped {
            self.events.emit(SchedulerEvent::TaskSkipped(output));
        }
        self.emit_status();
    }

    fn emit_status(&mut self) {
        let status = self.scheduler.run_status().clone();
        self.events.emit(SchedulerEvent::StatusChange(status));
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned());

    match detail {
        Some(detail) => format!("task panicked: {detail}"),
        None => "task panicked".to_string(),
    }
}
