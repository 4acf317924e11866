// src/engine/events.rs

//! Observability surface of a run.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::trace;

use crate::types::{RunStatus, TaskId, TaskOutput};

/// Notifications emitted by the runtime, in the order things happen.
///
/// They are side-effect notifications only and never influence scheduling.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// The run status changed (run start, dispatch, completion, skip, finish).
    StatusChange(RunStatus),
    /// A task body was handed to a worker.
    TaskStarted {
        task_id: TaskId,
        started_at: DateTime<Utc>,
    },
    TaskCompleted(TaskOutput),
    TaskFailed(TaskOutput),
    TaskSkipped(TaskOutput),
}

impl SchedulerEvent {
    /// Task id for task-level events.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            SchedulerEvent::StatusChange(_) => None,
            SchedulerEvent::TaskStarted { task_id, .. } => Some(task_id),
            SchedulerEvent::TaskCompleted(o)
            | SchedulerEvent::TaskFailed(o)
            | SchedulerEvent::TaskSkipped(o) => Some(&o.task_id),
        }
    }
}

/// Fan-out of [`SchedulerEvent`]s to any number of subscribers.
///
/// Each subscriber gets its own unbounded channel, so emitting never blocks
/// the coordinating loop. Subscribers that dropped their receiver are
/// forgotten on the next emit.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<mpsc::UnboundedSender<SchedulerEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SchedulerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn emit(&mut self, event: SchedulerEvent) {
        if self.subscribers.is_empty() {
            return;
        }
        trace!(?event, "emitting scheduler event");
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
