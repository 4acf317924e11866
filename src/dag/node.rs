// src/dag/node.rs

//! Scheduler-internal task nodes.

use std::sync::Arc;

use crate::dag::task::TaskDefinition;
use crate::types::{NodeStatus, TaskId, TaskOutput};

/// One node per [`TaskDefinition`], created when the scheduler is built.
///
/// Only the scheduler mutates `status` and `output`.
#[derive(Debug, Clone)]
pub struct TaskNode {
    pub definition: Arc<TaskDefinition>,
    /// Ids this node depends on (copied from the definition).
    pub dependencies: Vec<TaskId>,
    /// Ids of nodes that depend on this node.
    pub dependents: Vec<TaskId>,
    pub status: NodeStatus,
    /// Set once the node reaches a terminal status in the current run.
    pub output: Option<TaskOutput>,
}

impl TaskNode {
    pub fn new(
        definition: Arc<TaskDefinition>,
        dependencies: Vec<TaskId>,
        dependents: Vec<TaskId>,
    ) -> Self {
        Self {
            definition,
            dependencies,
            dependents,
            status: NodeStatus::Pending,
            output: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    /// Back to a clean `Pending` state at the start of a run.
    pub fn reset(&mut self) {
        self.status = NodeStatus::Pending;
        self.output = None;
    }
}

/// Read-only snapshot of a node, for tests and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskNodeState {
    pub id: TaskId,
    pub status: NodeStatus,
    pub output: Option<TaskOutput>,
}

impl From<&TaskNode> for TaskNodeState {
    fn from(node: &TaskNode) -> Self {
        Self {
            id: node.id().to_string(),
            status: node.status,
            output: node.output.clone(),
        }
    }
}
