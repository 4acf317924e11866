// src/engine/mod.rs

//! Orchestration engine for dagrun.
//!
//! The pure scheduling state machine lives in [`crate::dag::Scheduler`]; this
//! module is the async shell around it:
//! - [`runtime`] owns the coordinating loop that dispatches ready tasks up to
//!   the concurrency budget and waits for any one of them to finish
//! - [`events`] fans run notifications out to subscribers

use std::time::Duration;

use crate::errors::{DagError, Result};
use crate::types::TaskId;

pub mod events;
pub mod runtime;

pub use events::{EventBus, SchedulerEvent};
pub use runtime::Runtime;

/// Options consumed at `run()` time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Task whose dependency closure is executed.
    pub entry: TaskId,
    /// Maximum number of simultaneously running tasks (>= 1).
    pub concurrency: usize,
    /// Stop dispatching new tasks after the first failure.
    pub stop_on_error: bool,
    /// Overall limit for the whole run.
    pub timeout: Option<Duration>,
}

impl RunConfig {
    pub fn new(entry: impl Into<TaskId>, concurrency: usize) -> Self {
        Self {
            entry: entry.into(),
            concurrency,
            stop_on_error: false,
            timeout: None,
        }
    }

    pub fn stop_on_error(mut self, stop: bool) -> Self {
        self.stop_on_error = stop;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(DagError::InvalidRunConfig(
                "concurrency must be >= 1 (got 0)".to_string(),
            ));
        }
        if self.entry.is_empty() {
            return Err(DagError::InvalidRunConfig("entry task id is empty".to_string()));
        }
        Ok(())
    }
}
