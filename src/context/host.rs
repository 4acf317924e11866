// src/context/host.rs

//! Task context backed by the host machine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::context::model::{DisabledModel, ModelInvoker};
use crate::context::{ContextError, ContextFactory, DependencyOutputs, ShellOutput, TaskContext};
use crate::exec::shell::run_shell;
use crate::fs::{FileSystem, RealFileSystem};
use crate::types::{BoxFuture, TaskOutput};

/// Creates [`HostContext`]s that share one filesystem, one model invoker and
/// one working directory.
///
/// Relative paths and shell commands are resolved against `root`.
#[derive(Clone)]
pub struct HostContextFactory {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    model: Arc<dyn ModelInvoker>,
}

impl HostContextFactory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            fs: Arc::new(RealFileSystem),
            model: Arc::new(DisabledModel),
        }
    }

    pub fn with_filesystem(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_model(mut self, model: Arc<dyn ModelInvoker>) -> Self {
        self.model = model;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for HostContextFactory {
    fn default() -> Self {
        Self::new(std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

impl ContextFactory for HostContextFactory {
    fn create(&self, task_id: &str, dependencies: DependencyOutputs) -> Arc<dyn TaskContext> {
        debug!(task = %task_id, deps = dependencies.len(), "creating host task context");
        Arc::new(HostContext {
            task_id: task_id.to_string(),
            root: self.root.clone(),
            fs: Arc::clone(&self.fs),
            model: Arc::clone(&self.model),
            dependencies,
        })
    }
}

/// Per-task capability set on the host.
pub struct HostContext {
    task_id: String,
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    model: Arc<dyn ModelInvoker>,
    dependencies: DependencyOutputs,
}

impl HostContext {
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl TaskContext for HostContext {
    fn task_id(&self) -> &str {
        &self.task_id
    }

    fn read_file<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<String, ContextError>> {
        let full = self.resolve(path);
        let fs = Arc::clone(&self.fs);
        Box::pin(async move {
            let target = full.clone();
            tokio::task::spawn_blocking(move || fs.read_to_string(&target))
                .await
                .map_err(|e| ContextError::File {
                    path: full.clone(),
                    message: e.to_string(),
                })?
                .map_err(|e| ContextError::File {
                    path: full,
                    message: format!("{e:#}"),
                })
        })
    }

    fn write_file<'a>(
        &'a self,
        path: &'a Path,
        content: &'a str,
    ) -> BoxFuture<'a, Result<(), ContextError>> {
        let full = self.resolve(path);
        let fs = Arc::clone(&self.fs);
        let bytes = content.as_bytes().to_vec();
        Box::pin(async move {
            let target = full.clone();
            tokio::task::spawn_blocking(move || fs.write(&target, &bytes))
                .await
                .map_err(|e| ContextError::File {
                    path: full.clone(),
                    message: e.to_string(),
                })?
                .map_err(|e| ContextError::File {
                    path: full,
                    message: format!("{e:#}"),
                })
        })
    }

    fn invoke_model<'a>(
        &'a self,
        prompt: &'a str,
        model_hint: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String, ContextError>> {
        Box::pin(async move {
            self.model
                .invoke(prompt, model_hint)
                .await
                .map_err(|e| ContextError::Model(format!("{e:#}")))
        })
    }

    fn run_shell_command<'a>(
        &'a self,
        command: &'a str,
    ) -> BoxFuture<'a, Result<ShellOutput, ContextError>> {
        Box::pin(async move {
            run_shell(command, Some(&self.root))
                .await
                .map_err(|e| ContextError::Shell(format!("{e:#}")))
        })
    }

    fn get_dependency_output(&self, task_id: &str) -> Result<TaskOutput, ContextError> {
        self.dependencies.get(task_id)
    }
}
