#![allow(dead_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use dagrun::config::{ConfigFile, ModelSection, RawConfigFile, RunSection, TaskConfig};
use dagrun::types::Artifacts;
use dagrun::{task_fn, TaskDefinition};

/// A definition whose body succeeds immediately with an `id` artifact.
pub fn ok_task(id: &str, deps: &[&str]) -> TaskDefinition {
    let name = id.to_string();
    TaskDefinition::new(
        id,
        task_fn(move |_| {
            let name = name.clone();
            async move { Ok(Artifacts::from([("id".to_string(), name)])) }
        }),
    )
    .depends_on(deps.iter().copied())
}

/// A definition whose body fails with `message`.
pub fn failing_task(id: &str, deps: &[&str], message: &str) -> TaskDefinition {
    let message = message.to_string();
    TaskDefinition::new(
        id,
        task_fn(move |_| {
            let message = message.clone();
            async move { Err(anyhow::anyhow!(message)) }
        }),
    )
    .depends_on(deps.iter().copied())
}

/// A definition whose body sleeps before succeeding.
pub fn sleepy_task(id: &str, deps: &[&str], delay: Duration) -> TaskDefinition {
    TaskDefinition::new(
        id,
        task_fn(move |_| async move {
            tokio::time::sleep(delay).await;
            Ok(Artifacts::new())
        }),
    )
    .depends_on(deps.iter().copied())
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                run: RunSection::default(),
                model: ModelSection::default(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn entry(mut self, entry: &str) -> Self {
        self.config.run.entry = Some(entry.to_string());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.run.concurrency = n;
        self
    }

    pub fn stop_on_error(mut self, val: bool) -> Self {
        self.config.run.stop_on_error = val;
        self
    }

    pub fn model_command(mut self, program: &str, args: &[&str]) -> Self {
        self.config.model.command = Some(program.to_string());
        self.config.model.args = args.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn shell(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                cmd: Some(cmd.to_string()),
                ..TaskConfig::default()
            },
        }
    }

    pub fn prompt(prompt: &str) -> Self {
        Self {
            task: TaskConfig {
                prompt: Some(prompt.to_string()),
                ..TaskConfig::default()
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn prompt_file(mut self, path: &str) -> Self {
        self.task.prompt_file = Some(path.to_string());
        self
    }

    pub fn model(mut self, model: &str) -> Self {
        self.task.model = Some(model.to_string());
        self
    }

    pub fn output(mut self, path: &str) -> Self {
        self.task.output = Some(path.to_string());
        self
    }

    pub fn capture(mut self, name: &str, pattern: &str) -> Self {
        self.task.capture.insert(name.to_string(), pattern.to_string());
        self
    }

    pub fn timeout(mut self, duration: &str) -> Self {
        self.task.timeout = Some(duration.to_string());
        self
    }

    pub fn retries(mut self, n: u32, backoff: &str) -> Self {
        self.task.retries = n;
        self.task.retry_backoff = Some(backoff.to_string());
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
