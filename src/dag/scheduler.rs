use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::context::DependencyOutputs;
use crate::dag::graph::DagGraph;
use crate::dag::node::{TaskNode, TaskNodeState};
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::{StateManager, RUN_ABANDONED};
use crate::dag::task::TaskDefinition;
use crate::errors::Result;
use crate::types::{NodeStatus, RunState, RunStatus, TaskId, TaskOutput};

/// Everything the async shell needs to start one task body.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub definition: Arc<TaskDefinition>,
    /// Outputs of the task's transitive dependencies, as recorded so far.
    pub dependencies: DependencyOutputs,
}

/// Scheduler core: the validated DAG plus mutable per-run state.
///
/// This type is synchronous and performs no IO; the async loop in
/// [`crate::engine::Runtime`] drives it. It is responsible for:
/// - restricting a run to the dependency closure of its entry task
/// - resetting that subgraph at the start of every run
/// - computing the ready set and propagating skips
/// - recording terminal outputs and keeping [`RunStatus`] in sync
#[derive(Debug)]
pub struct Scheduler {
    graph: DagGraph,
    nodes: HashMap<TaskId, TaskNode>,
    /// Monotonically increasing run ID.
    run_counter: u64,
    /// Currently active run ID, or `None` if there is no active run.
    current_run_id: Option<u64>,
    /// Subgraph of the current (or last) run, in definition order.
    subgraph: Vec<TaskId>,
    /// Ready nodes waiting for a dispatch slot, in discovery order.
    ready: VecDeque<TaskId>,
    status: RunStatus,
}

impl Scheduler {
    /// Build the graph from caller-supplied definitions.
    ///
    /// Fails with a configuration error on duplicate ids, unknown
    /// dependencies or a cycle; no scheduler is produced in that case.
    pub fn new(definitions: Vec<TaskDefinition>) -> Result<Self> {
        let graph = DagGraph::build(definitions)?;
        Ok(Self::from_graph(graph))
    }

    pub fn from_graph(graph: DagGraph) -> Self {
        let mut nodes = HashMap::with_capacity(graph.len());

        for id in graph.tasks() {
            if let Some(definition) = graph.definition(id) {
                let node = TaskNode::new(
                    Arc::clone(definition),
                    graph.dependencies_of(id).to_vec(),
                    graph.dependents_of(id).to_vec(),
                );
                nodes.insert(id.to_string(), node);
            }
        }

        Self {
            graph,
            nodes,
            run_counter: 0,
            current_run_id: None,
            subgraph: Vec::new(),
            ready: VecDeque::new(),
            status: RunStatus::pending(),
        }
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    /// Returns `true` if there is currently no active run.
    pub fn is_idle(&self) -> bool {
        self.current_run_id.is_none()
    }

    /// Current run ID, if any.
    pub fn current_run_id(&self) -> Option<u64> {
        self.current_run_id
    }

    /// Status of a node, or `None` for an unknown id.
    pub fn status_of(&self, task: &str) -> Option<NodeStatus> {
        self.nodes.get(task).map(|n| n.status)
    }

    /// Read-only snapshot of a node.
    pub fn node(&self, task: &str) -> Option<TaskNodeState> {
        self.nodes.get(task).map(TaskNodeState::from)
    }

    /// The status record of the current (or last finished) run.
    pub fn run_status(&self) -> &RunStatus {
        &self.status
    }

    /// Subgraph of the current (or last) run, in definition order.
    pub fn subgraph(&self) -> &[TaskId] {
        &self.subgraph
    }

    pub fn has_failures(&self) -> bool {
        self.status.failed_tasks > 0
    }

    /// Close a run whose driver went away before calling [`Scheduler::finish`],
    /// e.g. because the run future was dropped. Running nodes are failed and
    /// the rest of its subgraph is swept.
    fn abandon_active_run(&mut self) {
        let Some(run_id) = self.current_run_id else {
            return;
        };
        warn!(run_id, "previous run was never finished; closing it");

        let failed = StateManager::new(&mut self.nodes, run_id)
            .fail_running(&self.subgraph, RUN_ABANDONED);
        for output in failed {
            self.status.running_task_ids.retain(|id| *id != output.task_id);
            self.status.failed_tasks += 1;
            self.status.outputs.insert(output.task_id.clone(), output);
        }
        self.sweep(RUN_ABANDONED);
        self.finish();
    }

    /// Start a new run rooted at `entry`.
    ///
    /// Resolves the subgraph, resets its nodes to `Pending` and initializes
    /// a `Running` [`RunStatus`]. Nodes outside the subgraph keep whatever
    /// state they had.
    pub fn start_run(&mut self, entry: &str) -> Result<u64> {
        let members = self.graph.subgraph_from(entry)?;
        self.abandon_active_run();
        let subgraph: Vec<TaskId> = self
            .graph
            .ordered(&members)
            .into_iter()
            .map(str::to_string)
            .collect();

        self.run_counter += 1;
        let run_id = self.run_counter;
        self.current_run_id = Some(run_id);

        StateManager::new(&mut self.nodes, run_id).reset(&subgraph);

        self.status = RunStatus {
            state: RunState::Running,
            total_tasks: subgraph.len(),
            ..RunStatus::pending()
        };
        self.subgraph = subgraph;
        self.ready.clear();

        info!(
            run_id,
            entry,
            total_tasks = self.status.total_tasks,
            "scheduler: starting new DAG run"
        );
        Ok(run_id)
    }

    /// Ready-set computation for the active run.
    ///
    /// Newly ready nodes are queued for [`Scheduler::next_ready`]; skip
    /// outputs are recorded in the run status and returned.
    pub fn step(&mut self) -> SchedulerStep {
        let Some(run_id) = self.current_run_id else {
            warn!("step called with no active run; ignoring");
            return SchedulerStep::default();
        };

        let step = StateManager::new(&mut self.nodes, run_id).collect_ready(&self.subgraph);

        self.ready.extend(step.newly_ready.iter().cloned());
        for output in &step.newly_skipped {
            self.status
                .outputs
                .insert(output.task_id.clone(), output.clone());
        }

        step
    }

    /// Pop the next ready node, in discovery order.
    pub fn next_ready(&mut self) -> Option<TaskId> {
        self.ready.pop_front()
    }

    /// Move a ready node to `Running` and hand back what is needed to run it.
    pub fn mark_running(&mut self, task: &str) -> Option<Dispatch> {
        let run_id = self.current_run_id?;

        if !StateManager::new(&mut self.nodes, run_id).mark_running(task) {
            return None;
        }

        self.ready.retain(|id| id != task);
        self.status.running_task_ids.push(task.to_string());

        let mut dependencies = DependencyOutputs::new();
        for dep in self.graph.ancestors_of(task) {
            if let Some(output) = self.status.outputs.get(&dep) {
                dependencies.insert(output.clone());
            }
        }

        let definition = Arc::clone(&self.nodes.get(task)?.definition);
        debug!(task, run_id, "marked Running");

        Some(Dispatch {
            definition,
            dependencies,
        })
    }

    /// Record the terminal output of a running task.
    ///
    /// Returns the node's new status (`Completed` or `Failed`), or `None` if
    /// the task was not running in this run.
    pub fn complete(&mut self, output: TaskOutput) -> Option<NodeStatus> {
        let run_id = self.current_run_id?;
        let task = output.task_id.clone();

        let status = StateManager::new(&mut self.nodes, run_id).record_terminal(output.clone())?;

        self.status.running_task_ids.retain(|id| *id != task);
        match status {
            NodeStatus::Completed => self.status.completed_tasks += 1,
            NodeStatus::Failed => self.status.failed_tasks += 1,
            _ => {}
        }
        self.status.outputs.insert(task, output);

        Some(status)
    }

    /// Skip every node of the subgraph that never got to run.
    pub fn sweep(&mut self, reason: &str) -> Vec<TaskOutput> {
        let Some(run_id) = self.current_run_id else {
            return Vec::new();
        };

        self.ready.clear();
        let swept = StateManager::new(&mut self.nodes, run_id).sweep(&self.subgraph, reason);
        for output in &swept {
            self.status
                .outputs
                .insert(output.task_id.clone(), output.clone());
        }
        swept
    }

    /// Finalize the run status and return to idle.
    pub fn finish(&mut self) -> RunStatus {
        if let Some(run_id) = self.current_run_id.take() {
            let mgr = StateManager::new(&mut self.nodes, run_id);
            if !mgr.all_terminal(&self.subgraph) {
                warn!(run_id, "finishing run with non-terminal tasks");
            }

            self.status.state = if self.status.failed_tasks == 0 {
                RunState::Completed
            } else {
                RunState::Failed
            };
            self.status.ended_at = Some(Utc::now());

            info!(
                run_id,
                state = %self.status.state,
                completed = self.status.completed_tasks,
                failed = self.status.failed_tasks,
                skipped = self.status.skipped_tasks(),
                "scheduler: run finished"
            );
        }

        self.status.clone()
    }
}
