// src/dag/mod.rs

//! DAG representation and scheduling state.
//!
//! - [`graph`] builds and validates the task graph (reverse edges, cycle
//!   check, subgraph selection).
//! - [`task`] holds caller-supplied task definitions and the `Task` trait.
//! - [`node`] is the scheduler-internal per-task state.
//! - [`scheduler`] contains the per-run state machine that decides which
//!   tasks are ready, skipped or finished.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] manages per-run state transitions.

pub mod graph;
pub mod node;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod task;

pub use graph::DagGraph;
pub use node::{TaskNode, TaskNodeState};
pub use scheduler::{Dispatch, Scheduler};
pub use scheduler_step::SchedulerStep;
pub use state_manager::DEPENDENCY_FAILED;
pub use task::{task_fn, FnTask, RetryPolicy, Task, TaskDefinition};
