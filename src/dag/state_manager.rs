// src/dag/state_manager.rs

//! Per-run state management for task nodes.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::dag::node::TaskNode;
use crate::dag::scheduler_step::SchedulerStep;
use crate::types::{NodeStatus, OutputStatus, TaskId, TaskOutput};

/// Message recorded on outputs of tasks skipped because of an upstream failure.
pub const DEPENDENCY_FAILED: &str = "dependency failed";
/// Recorded on tasks of a run that was never finished by its driver.
pub const RUN_ABANDONED: &str = "run abandoned before it finished";

/// How the dependencies of a pending node currently stand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepsState {
    /// Every dependency is `Completed`.
    Satisfied,
    /// At least one dependency is `Failed` or `Skipped`.
    Blocked,
    /// Some dependency has not reached a terminal status yet.
    Waiting,
}

/// Manages per-run state transitions for the nodes of one run's subgraph.
pub struct StateManager<'a> {
    nodes: &'a mut HashMap<TaskId, TaskNode>,
    run_id: u64,
}

impl<'a> StateManager<'a> {
    pub fn new(nodes: &'a mut HashMap<TaskId, TaskNode>, run_id: u64) -> Self {
        Self { nodes, run_id }
    }

    /// Reset every node of the subgraph to `Pending` and clear its output.
    /// Nodes outside the subgraph are left untouched.
    pub fn reset(&mut self, subgraph: &[TaskId]) {
        for id in subgraph {
            if let Some(node) = self.nodes.get_mut(id) {
                node.reset();
            }
        }
        debug!(run_id = self.run_id, tasks = subgraph.len(), "subgraph reset to Pending");
    }

    pub fn deps_state(&self, node: &TaskNode) -> DepsState {
        ReadOnlyStateManager::new(&*self.nodes).deps_state(node)
    }

    /// Ready-set computation over the `Pending` nodes of the subgraph.
    ///
    /// Nodes with a failed or skipped dependency are marked `Skipped` and get
    /// a synthesized output; nodes whose dependencies all completed move to
    /// `Ready`. Skips are applied until nothing changes, so a whole chain of
    /// dependents is skipped in one step regardless of definition order.
    pub fn collect_ready(&mut self, subgraph: &[TaskId]) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        loop {
            let mut changed = false;

            for id in subgraph {
                let decision = match self.nodes.get(id) {
                    Some(node) if node.status == NodeStatus::Pending => self.deps_state(node),
                    _ => continue,
                };

                match decision {
                    DepsState::Blocked => {
                        let output = TaskOutput::skipped(id.clone(), DEPENDENCY_FAILED);
                        if let Some(node) = self.nodes.get_mut(id) {
                            node.status = NodeStatus::Skipped;
                            node.output = Some(output.clone());
                        }
                        info!(task = %id, run_id = self.run_id, "dependency failed; skipping task");
                        step.newly_skipped.push(output);
                        changed = true;
                    }
                    DepsState::Satisfied => {
                        if let Some(node) = self.nodes.get_mut(id) {
                            node.status = NodeStatus::Ready;
                        }
                        debug!(task = %id, run_id = self.run_id, "dependencies satisfied; marking Ready");
                        step.newly_ready.push(id.clone());
                    }
                    DepsState::Waiting => {}
                }
            }

            if !changed {
                break;
            }
        }

        step
    }

    /// `Ready -> Running`. Returns `false` (and changes nothing) for any other
    /// starting status.
    pub fn mark_running(&mut self, id: &str) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) if node.status == NodeStatus::Ready => {
                node.status = NodeStatus::Running;
                true
            }
            Some(node) => {
                warn!(
                    task = %id,
                    status = %node.status,
                    "refusing to dispatch a task that is not Ready"
                );
                false
            }
            None => {
                warn!(task = %id, "dispatch requested for unknown task");
                false
            }
        }
    }

    /// `Running -> Completed | Failed`, storing the output.
    ///
    /// Returns the new status, or `None` if the node was not running.
    pub fn record_terminal(&mut self, output: TaskOutput) -> Option<NodeStatus> {
        let Some(node) = self.nodes.get_mut(&output.task_id) else {
            warn!(task = %output.task_id, "completion for unknown task; ignoring");
            return None;
        };

        if node.status != NodeStatus::Running {
            warn!(
                task = %output.task_id,
                status = %node.status,
                "completion for a task that is not Running; ignoring"
            );
            return None;
        }

        let status = match output.status {
            OutputStatus::Success => NodeStatus::Completed,
            OutputStatus::Error | OutputStatus::Skipped => NodeStatus::Failed,
        };
        node.status = status;
        node.output = Some(output);
        Some(status)
    }

    /// Mark every node of the subgraph that never started as `Skipped` with
    /// the given reason.
    ///
    /// Queued `Ready` nodes go back to `Pending` first, so every skip follows
    /// the `Pending -> Skipped` edge.
    pub fn sweep(&mut self, subgraph: &[TaskId], reason: &str) -> Vec<TaskOutput> {
        let mut swept = Vec::new();

        for id in subgraph {
            if let Some(node) = self.nodes.get_mut(id) {
                if node.status == NodeStatus::Ready {
                    node.status = NodeStatus::Pending;
                }
                if node.status == NodeStatus::Pending {
                    let output = TaskOutput::skipped(id.clone(), reason);
                    node.status = NodeStatus::Skipped;
                    node.output = Some(output.clone());
                    debug!(task = %id, run_id = self.run_id, reason, "swept unfinished task");
                    swept.push(output);
                }
            }
        }

        swept
    }

    /// `Running -> Failed` for every node of the subgraph still running, with
    /// the given reason. Used when a run's workers are gone.
    pub fn fail_running(&mut self, subgraph: &[TaskId], reason: &str) -> Vec<TaskOutput> {
        let mut failed = Vec::new();

        for id in subgraph {
            if let Some(node) = self.nodes.get_mut(id) {
                if node.status == NodeStatus::Running {
                    let output = TaskOutput::failed(id.clone(), reason, Utc::now(), 0, 1);
                    node.status = NodeStatus::Failed;
                    node.output = Some(output.clone());
                    warn!(task = %id, run_id = self.run_id, reason, "running task left behind");
                    failed.push(output);
                }
            }
        }

        failed
    }

    /// Whether every node of the subgraph is in a terminal state.
    pub fn all_terminal(&self, subgraph: &[TaskId]) -> bool {
        subgraph.iter().all(|id| {
            self.nodes
                .get(id)
                .is_some_and(|node| node.status.is_terminal())
        })
    }
}

/// A read-only view of the nodes for checking dependency satisfaction.
pub struct ReadOnlyStateManager<'a> {
    nodes: &'a HashMap<TaskId, TaskNode>,
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(nodes: &'a HashMap<TaskId, TaskNode>) -> Self {
        Self { nodes }
    }

    /// Classify the dependencies of `node` for the current run.
    ///
    /// A blocking dependency wins over one that is still in progress: a node
    /// is skipped as soon as any dependency failed, without waiting for its
    /// siblings.
    pub fn deps_state(&self, node: &TaskNode) -> DepsState {
        let mut waiting = false;

        for dep_id in &node.dependencies {
            let Some(dep) = self.nodes.get(dep_id) else {
                // Cannot happen for a validated graph.
                warn!(task = %node.id(), dep = %dep_id, "dependency missing from node map");
                return DepsState::Blocked;
            };

            if dep.status.blocks_dependents() {
                return DepsState::Blocked;
            }
            if dep.status != NodeStatus::Completed {
                waiting = true;
            }
        }

        if waiting {
            DepsState::Waiting
        } else {
            DepsState::Satisfied
        }
    }
}
