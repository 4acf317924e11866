// src/context/mod.rs

//! Capabilities handed to a task body at dispatch time.
//!
//! The scheduler never calls the filesystem, a model or a shell itself; it
//! only builds a fresh [`TaskContext`] per dispatched task through a
//! [`ContextFactory`] and passes it to the body.
//!
//! - [`host`] is the implementation used by the `dagrun` binary.
//! - [`model`] abstracts the external language-model invocation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{BoxFuture, OutputStatus, TaskId, TaskOutput};

pub mod host;
pub mod model;

pub use host::{HostContext, HostContextFactory};
pub use model::{CommandModelInvoker, DisabledModel, ModelInvoker};

/// Errors surfaced to task bodies by their context.
#[derive(Debug, Error)]
pub enum ContextError {
    /// `get_dependency_output` for a task without a successful output.
    #[error("dependency '{0}' has not completed")]
    DependencyNotCompleted(String),

    #[error("file error for {path:?}: {message}")]
    File { path: PathBuf, message: String },

    #[error("model invocation failed: {0}")]
    Model(String),

    #[error("shell command could not be run: {0}")]
    Shell(String),
}

/// Captured result of a shell command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code; `-1` when the process was killed by a signal.
    pub exit_code: i32,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Capability set available to a running task.
pub trait TaskContext: Send + Sync {
    /// Id of the task this context was created for.
    fn task_id(&self) -> &str;

    fn read_file<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<String, ContextError>>;

    fn write_file<'a>(
        &'a self,
        path: &'a Path,
        content: &'a str,
    ) -> BoxFuture<'a, Result<(), ContextError>>;

    /// Call the external language model. No retry happens at this level.
    fn invoke_model<'a>(
        &'a self,
        prompt: &'a str,
        model_hint: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String, ContextError>>;

    fn run_shell_command<'a>(
        &'a self,
        command: &'a str,
    ) -> BoxFuture<'a, Result<ShellOutput, ContextError>>;

    /// Output of a dependency that completed successfully in this run.
    fn get_dependency_output(&self, task_id: &str) -> Result<TaskOutput, ContextError>;
}

/// Builds one fresh [`TaskContext`] per dispatched task.
pub trait ContextFactory: Send + Sync {
    fn create(&self, task_id: &str, dependencies: DependencyOutputs) -> Arc<dyn TaskContext>;
}

/// Immutable snapshot of dependency outputs taken at dispatch time.
#[derive(Debug, Clone, Default)]
pub struct DependencyOutputs {
    outputs: HashMap<TaskId, TaskOutput>,
}

impl DependencyOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, output: TaskOutput) {
        self.outputs.insert(output.task_id.clone(), output);
    }

    /// The recorded output of `task_id`, if it completed successfully.
    pub fn get(&self, task_id: &str) -> Result<TaskOutput, ContextError> {
        match self.outputs.get(task_id) {
            Some(output) if output.status == OutputStatus::Success => Ok(output.clone()),
            _ => Err(ContextError::DependencyNotCompleted(task_id.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }
}

impl FromIterator<TaskOutput> for DependencyOutputs {
    fn from_iter<I: IntoIterator<Item = TaskOutput>>(iter: I) -> Self {
        let mut deps = Self::new();
        for output in iter {
            deps.insert(output);
        }
        deps
    }
}
