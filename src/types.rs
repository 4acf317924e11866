// src/types.rs

//! Shared data model: task ids, node/output/run states and the records a run
//! produces.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical task identifier type used throughout the crate.
pub type TaskId = String;

/// Named string values produced by a task body.
pub type Artifacts = BTreeMap<String, String>;

/// Status of a task node inside the scheduler.
///
/// Within a single run the status only moves forward:
/// `Pending -> Ready -> Running -> Completed | Failed`, or `Pending -> Skipped`.
/// A `Ready` node that is never dispatched returns to `Pending` before it is
/// swept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl NodeStatus {
    /// `true` for `Completed`, `Failed` and `Skipped`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeStatus::Completed | NodeStatus::Failed | NodeStatus::Skipped
        )
    }

    /// A dependency in this state makes its dependents unrunnable.
    pub fn blocks_dependents(self) -> bool {
        matches!(self, NodeStatus::Failed | NodeStatus::Skipped)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Ready => "ready",
            NodeStatus::Running => "running",
            NodeStatus::Completed => "completed",
            NodeStatus::Failed => "failed",
            NodeStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Outcome recorded in a [`TaskOutput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStatus {
    Success,
    Error,
    Skipped,
}

/// Aggregate state of one scheduler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Pending => "pending",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Result record produced exactly once per node per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub task_id: TaskId,
    pub status: OutputStatus,
    #[serde(default)]
    pub artifacts: Artifacts,
    /// Present iff `status` is `Error` or `Skipped`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    /// Number of attempts made by the runner (0 for skipped tasks).
    #[serde(default)]
    pub attempts: u32,
}

impl TaskOutput {
    pub fn success(
        task_id: impl Into<TaskId>,
        artifacts: Artifacts,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        attempts: u32,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            status: OutputStatus::Success,
            artifacts,
            error: None,
            duration_ms,
            started_at,
            attempts,
        }
    }

    pub fn failed(
        task_id: impl Into<TaskId>,
        error: impl Into<String>,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        attempts: u32,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            status: OutputStatus::Error,
            artifacts: Artifacts::new(),
            error: Some(error.into()),
            duration_ms,
            started_at,
            attempts,
        }
    }

    /// Synthesized output for a task that never ran.
    pub fn skipped(task_id: impl Into<TaskId>, reason: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: OutputStatus::Skipped,
            artifacts: Artifacts::new(),
            error: Some(reason.into()),
            duration_ms: 0,
            started_at: Utc::now(),
            attempts: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutputStatus::Success
    }

    /// Convenience accessor for a single artifact.
    pub fn artifact(&self, name: &str) -> Option<&str> {
        self.artifacts.get(name).map(String::as_str)
    }
}

/// Aggregate status of one invocation of the scheduler.
///
/// Emitted on every change and returned when the run finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    pub state: RunState,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    /// In-flight tasks, in dispatch order.
    pub running_task_ids: Vec<TaskId>,
    pub outputs: BTreeMap<TaskId, TaskOutput>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl RunStatus {
    /// A fresh status for a run that has not started yet.
    pub fn pending() -> Self {
        Self {
            state: RunState::Pending,
            total_tasks: 0,
            completed_tasks: 0,
            failed_tasks: 0,
            running_task_ids: Vec::new(),
            outputs: BTreeMap::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn skipped_tasks(&self) -> usize {
        self.outputs
            .values()
            .filter(|o| o.status == OutputStatus::Skipped)
            .count()
    }

    pub fn output(&self, task: &str) -> Option<&TaskOutput> {
        self.outputs.get(task)
    }
}

impl Default for RunStatus {
    fn default() -> Self {
        Self::pending()
    }
}

/// Boxed, sendable future used at the trait seams (task bodies, capabilities).
pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
