// src/dag/scheduler_step.rs

//! Step-by-step result types for the scheduler core.

use crate::types::{TaskId, TaskOutput};

/// Structured result of a single ready-set computation.
///
/// Useful for tests that drive the core by hand and assert on what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Tasks that became ready in this step, in discovery order.
    pub newly_ready: Vec<TaskId>,
    /// Skip outputs synthesized in this step because a dependency failed or
    /// was itself skipped.
    pub newly_skipped: Vec<TaskOutput>,
}

impl SchedulerStep {
    pub fn is_empty(&self) -> bool {
        self.newly_ready.is_empty() && self.newly_skipped.is_empty()
    }
}
