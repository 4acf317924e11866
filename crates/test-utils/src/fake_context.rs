use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use dagrun::context::{ContextError, ContextFactory, DependencyOutputs, ShellOutput, TaskContext};
use dagrun::fs::{FileSystem, MockFileSystem};
use dagrun::types::{BoxFuture, TaskOutput};

/// A model call seen by a [`FakeContextFactory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCall {
    pub task: String,
    pub prompt: String,
    pub model_hint: Option<String>,
}

#[derive(Debug, Default)]
struct Log {
    model_calls: Vec<ModelCall>,
    commands: Vec<(String, String)>,
    /// Dependency snapshot ids handed to each created context.
    created: Vec<(String, Vec<String>)>,
}

/// Context factory with canned capabilities and no real IO.
///
/// - files live in a shared [`MockFileSystem`]
/// - the model answers from a prompt-substring table, otherwise echoes
///   `"echo: <prompt>"`; a prompt containing `FAIL_MODEL` fails
/// - shell commands answer from an exact-match table, otherwise succeed with
///   the command itself as stdout
#[derive(Debug, Clone, Default)]
pub struct FakeContextFactory {
    fs: MockFileSystem,
    model_answers: Arc<Mutex<Vec<(String, String)>>>,
    shell_answers: Arc<Mutex<HashMap<String, ShellOutput>>>,
    log: Arc<Mutex<Log>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl FakeContextFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fs(&self) -> &MockFileSystem {
        &self.fs
    }

    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.fs.add_file(path, content);
        self
    }

    /// Answer `response` to any prompt containing `needle`.
    pub fn with_model_answer(self, needle: &str, response: &str) -> Self {
        lock(&self.model_answers).push((needle.to_string(), response.to_string()));
        self
    }

    pub fn with_shell(self, command: &str, stdout: &str, exit_code: i32) -> Self {
        lock(&self.shell_answers).insert(
            command.to_string(),
            ShellOutput {
                stdout: stdout.to_string(),
                stderr: if exit_code == 0 { String::new() } else { format!("{command} failed") },
                exit_code,
            },
        );
        self
    }

    pub fn model_calls(&self) -> Vec<ModelCall> {
        lock(&self.log).model_calls.clone()
    }

    /// `(task, command)` pairs in execution order.
    pub fn commands(&self) -> Vec<(String, String)> {
        lock(&self.log).commands.clone()
    }

    /// Sorted ids of the dependency snapshot handed to `task`'s last context.
    pub fn snapshot_for(&self, task: &str) -> Option<Vec<String>> {
        lock(&self.log)
            .created
            .iter()
            .rev()
            .find(|(name, _)| name == task)
            .map(|(_, ids)| ids.clone())
    }
}

impl ContextFactory for FakeContextFactory {
    fn create(&self, task_id: &str, dependencies: DependencyOutputs) -> Arc<dyn TaskContext> {
        let mut ids: Vec<String> = dependencies.task_ids().map(str::to_string).collect();
        ids.sort();
        lock(&self.log).created.push((task_id.to_string(), ids));

        Arc::new(FakeContext {
            task_id: task_id.to_string(),
            factory: self.clone(),
            dependencies,
        })
    }
}

struct FakeContext {
    task_id: String,
    factory: FakeContextFactory,
    dependencies: DependencyOutputs,
}

impl TaskContext for FakeContext {
    fn task_id(&self) -> &str {
        &self.task_id
    }

    fn read_file<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<String, ContextError>> {
        Box::pin(async move {
            self.factory
                .fs
                .read_to_string(path)
                .map_err(|e| ContextError::File {
                    path: PathBuf::from(path),
                    message: e.to_string(),
                })
        })
    }

    fn write_file<'a>(
        &'a self,
        path: &'a Path,
        content: &'a str,
    ) -> BoxFuture<'a, Result<(), ContextError>> {
        Box::pin(async move {
            self.factory
                .fs
                .write(path, content.as_bytes())
                .map_err(|e| ContextError::File {
                    path: PathBuf::from(path),
                    message: e.to_string(),
                })
        })
    }

    fn invoke_model<'a>(
        &'a self,
        prompt: &'a str,
        model_hint: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String, ContextError>> {
        Box::pin(async move {
            lock(&self.factory.log).model_calls.push(ModelCall {
                task: self.task_id.clone(),
                prompt: prompt.to_string(),
                model_hint: model_hint.map(str::to_string),
            });

            if prompt.contains("FAIL_MODEL") {
                return Err(ContextError::Model("model refused".to_string()));
            }

            let answer = lock(&self.factory.model_answers)
                .iter()
                .find(|(needle, _)| prompt.contains(needle.as_str()))
                .map(|(_, response)| response.clone());
            Ok(answer.unwrap_or_else(|| format!("echo: {prompt}")))
        })
    }

    fn run_shell_command<'a>(
        &'a self,
        command: &'a str,
    ) -> BoxFuture<'a, Result<ShellOutput, ContextError>> {
        Box::pin(async move {
            lock(&self.factory.log)
                .commands
                .push((self.task_id.clone(), command.to_string()));

            let canned = lock(&self.factory.shell_answers).get(command).cloned();
            Ok(canned.unwrap_or_else(|| ShellOutput {
                stdout: format!("{command}\n"),
                stderr: String::new(),
                exit_code: 0,
            }))
        })
    }

    fn get_dependency_output(&self, task_id: &str) -> Result<TaskOutput, ContextError> {
        self.dependencies.get(task_id)
    }
}
