// src/dag/graph.rs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::dag::task::TaskDefinition;
use crate::errors::{DagError, Result};
use crate::types::TaskId;

/// Internal node structure: stores the definition plus immediate deps and
/// dependents.
#[derive(Debug, Clone)]
struct DagNode {
    definition: Arc<TaskDefinition>,
    /// Direct dependencies: tasks that must complete before this one can run.
    deps: Vec<TaskId>,
    /// Direct dependents: tasks that depend on this one.
    dependents: Vec<TaskId>,
}

/// In-memory DAG of task definitions keyed by task id.
///
/// Construction validates the graph once: duplicate ids, unknown
/// dependencies and cycles are all rejected, so a `DagGraph` value is always
/// acyclic. Definition order is remembered and used for every ordered walk.
#[derive(Debug, Clone)]
pub struct DagGraph {
    order: Vec<TaskId>,
    nodes: HashMap<TaskId, DagNode>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    OnStack,
    Done,
}

impl DagGraph {
    /// Build and validate a DAG from a flat list of definitions.
    pub fn build(definitions: Vec<TaskDefinition>) -> Result<Self> {
        let mut order: Vec<TaskId> = Vec::with_capacity(definitions.len());
        let mut nodes: HashMap<TaskId, DagNode> = HashMap::with_capacity(definitions.len());

        // First pass: create nodes with their dependency lists.
        for def in definitions {
            if nodes.contains_key(&def.id) {
                return Err(DagError::DuplicateTask(def.id));
            }
            let id = def.id.clone();
            order.push(id.clone());
            nodes.insert(
                id,
                DagNode {
                    deps: def.depends_on.clone(),
                    dependents: Vec::new(),
                    definition: Arc::new(def),
                },
            );
        }

        // Second pass: check references and populate dependents, in
        // definition order so that dependents lists are deterministic.
        for task_id in &order {
            let deps = nodes
                .get(task_id)
                .map(|n| n.deps.clone())
                .unwrap_or_default();

            for dep in deps {
                match nodes.get_mut(&dep) {
                    Some(dep_node) => dep_node.dependents.push(task_id.clone()),
                    None => {
                        return Err(DagError::UnknownDependency {
                            task: task_id.clone(),
                            dependency: dep,
                        });
                    }
                }
            }
        }

        let graph = Self { order, nodes };
        graph.validate()?;

        debug!(tasks = graph.len(), "task graph built and validated");
        Ok(graph)
    }

    /// Cycle check: depth-first search from every unvisited node, keeping the
    /// current path on an explicit stack of `(id, next dependency)` frames.
    /// Reaching a node that is on the path means a cycle. [`DagGraph::build`]
    /// already runs this once.
    pub fn validate(&self) -> Result<()> {
        let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(self.nodes.len());
        let mut stack: Vec<(&str, usize)> = Vec::new();

        for root in &self.order {
            if marks.contains_key(root.as_str()) {
                continue;
            }
            marks.insert(root.as_str(), Mark::OnStack);
            stack.push((root.as_str(), 0));

            while let Some(frame) = stack.last_mut() {
                let (id, next) = *frame;
                let Some(dep) = self.dependencies_of(id).get(next) else {
                    marks.insert(id, Mark::Done);
                    stack.pop();
                    continue;
                };
                frame.1 += 1;

                let dep = dep.as_str();
                match marks.get(dep) {
                    Some(Mark::OnStack) => return Err(Self::cycle_error(&stack, dep)),
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(dep, Mark::OnStack);
                        stack.push((dep, 0));
                    }
                }
            }
        }
        Ok(())
    }

    fn cycle_error(stack: &[(&str, usize)], back_to: &str) -> DagError {
        let start = stack.iter().position(|(id, _)| *id == back_to).unwrap_or(0);
        let mut cycle: Vec<&str> = stack[start..].iter().map(|(id, _)| *id).collect();
        cycle.push(back_to);
        DagError::DagCycle(format!("cycle detected in task DAG: {}", cycle.join(" -> ")))
    }

    /// Number of tasks in the graph.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// All task ids, in definition order.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    /// The definition registered under `id`.
    pub fn definition(&self, id: &str) -> Option<&Arc<TaskDefinition>> {
        self.nodes.get(id).map(|n| &n.definition)
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, id: &str) -> &[TaskId] {
        self.nodes
            .get(id)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task (tasks that list this one as a dependency).
    pub fn dependents_of(&self, id: &str) -> &[TaskId] {
        self.nodes
            .get(id)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// The entry task plus everything it transitively depends on.
    ///
    /// Walks `dependencies`, never `dependents`.
    pub fn subgraph_from(&self, entry: &str) -> Result<HashSet<TaskId>> {
        if !self.contains(entry) {
            return Err(DagError::TaskNotFound(entry.to_string()));
        }

        let mut visited: HashSet<TaskId> = HashSet::new();
        let mut stack: Vec<&str> = vec![entry];

        while let Some(id) = stack.pop() {
            if !visited.insert(id.to_string()) {
                continue;
            }
            stack.extend(self.dependencies_of(id).iter().map(|d| d.as_str()));
        }

        Ok(visited)
    }

    /// Members of `subset`, in definition order.
    pub fn ordered<'g>(&'g self, subset: &HashSet<TaskId>) -> Vec<&'g str> {
        self.tasks().filter(|id| subset.contains(*id)).collect()
    }

    /// Transitive dependencies of `id`, excluding `id` itself.
    pub fn ancestors_of(&self, id: &str) -> HashSet<TaskId> {
        let mut set = self.subgraph_from(id).unwrap_or_default();
        set.remove(id);
        set
    }

    /// A topological order (dependencies first) of the tasks in `subset`.
    ///
    /// Used for dry-run output; the scheduler itself does not need one.
    pub fn topological_order(&self, subset: &HashSet<TaskId>) -> Result<Vec<TaskId>> {
        // Edge direction: dep -> task.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

        for id in self.ordered(subset) {
            graph.add_node(id);
        }
        for id in self.ordered(subset) {
            for dep in self.dependencies_of(id) {
                if subset.contains(dep) {
                    graph.add_edge(dep.as_str(), id, ());
                }
            }
        }

        toposort(&graph, None)
            .map(|order| order.into_iter().map(str::to_string).collect())
            .map_err(|cycle| {
                DagError::DagCycle(format!(
                    "cycle detected in task DAG involving task '{}'",
                    cycle.node_id()
                ))
            })
    }
}
