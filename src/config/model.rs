// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::config::duration::parse_duration;
use crate::context::{CommandModelInvoker, DisabledModel, ModelInvoker};
use crate::dag::{RetryPolicy, Task, TaskDefinition};
use crate::engine::RunConfig;
use crate::errors::{DagError, Result};
use crate::tasks::{PromptSource, PromptTask, ShellTask, Template};

/// Top-level configuration as read from a TOML task file.
///
/// ```toml
/// [run]
/// entry = "report"
/// concurrency = 4
///
/// [model]
/// command = "claude"
/// args = ["-p"]
///
/// [task.fetch]
/// cmd = "curl -s https://example.com/data.json"
///
/// [task.report]
/// after = ["fetch"]
/// prompt = "Summarise {{fetch.stdout}}"
/// ```
///
/// This is the unvalidated form; see [`ConfigFile`].
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub run: RunSection,

    #[serde(default)]
    pub model: ModelSection,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// Validated configuration. Only obtainable through `TryFrom<RawConfigFile>`
/// (or [`ConfigFile::new_unchecked`] in tests).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub run: RunSection,
    pub model: ModelSection,
    pub task: BTreeMap<String, TaskConfig>,
}

/// `[run]` section: defaults for the run configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RunSection {
    /// Entry task; the `--entry` flag overrides it.
    #[serde(default)]
    pub entry: Option<String>,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub stop_on_error: bool,

    /// Overall run timeout, e.g. `"10m"`.
    #[serde(default)]
    pub timeout: Option<String>,
}

fn default_concurrency() -> usize {
    1
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            entry: None,
            concurrency: default_concurrency(),
            stop_on_error: false,
            timeout: None,
        }
    }
}

/// `[model]` section: the external program prompt tasks talk to.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelSection {
    /// Program to run; the prompt is written to its stdin.
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    /// Flag used to pass a task's `model` hint, e.g. `"--model"`.
    #[serde(default)]
    pub model_flag: Option<String>,
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskConfig {
    /// Shell command. Mutually exclusive with `prompt` / `prompt_file`.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Inline prompt template.
    #[serde(default)]
    pub prompt: Option<String>,

    /// Prompt template file, relative to the config file. Prepended to
    /// `prompt` when both are given.
    #[serde(default)]
    pub prompt_file: Option<String>,

    /// Model hint forwarded to the model program.
    #[serde(default)]
    pub model: Option<String>,

    /// Dependency list: this task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,

    /// Write the task's main output (stdout or model response) to this file.
    #[serde(default)]
    pub output: Option<String>,

    /// Extra artifacts: name -> regex applied to the main output; the first
    /// capture group (or the whole match) becomes the value.
    #[serde(default)]
    pub capture: BTreeMap<String, String>,

    /// Per-attempt timeout, e.g. `"30s"`.
    #[serde(default)]
    pub timeout: Option<String>,

    /// Extra attempts after the first failure.
    #[serde(default)]
    pub retries: u32,

    /// Base delay between attempts; doubles after each retry.
    #[serde(default)]
    pub retry_backoff: Option<String>,
}

impl TaskConfig {
    pub fn is_shell(&self) -> bool {
        self.cmd.is_some()
    }

    pub fn is_prompt(&self) -> bool {
        self.prompt.is_some() || self.prompt_file.is_some()
    }

    /// Short human description, used by `--dry-run`.
    pub fn describe(&self) -> String {
        match (&self.cmd, &self.prompt, &self.prompt_file) {
            (Some(cmd), _, _) => format!("cmd: {cmd}"),
            (None, _, Some(file)) => format!("prompt_file: {file}"),
            (None, Some(prompt), None) => format!("prompt: {}", prompt.lines().next().unwrap_or("")),
            (None, None, None) => "(empty)".to_string(),
        }
    }
}

impl ConfigFile {
    pub fn new_unchecked(
        run: RunSection,
        model: ModelSection,
        task: BTreeMap<String, TaskConfig>,
    ) -> Self {
        Self { run, model, task }
    }

    pub fn run_timeout(&self) -> Result<Option<Duration>> {
        parse_optional(self.run.timeout.as_deref(), "[run].timeout")
    }

    /// Build a [`RunConfig`] from `[run]`, with `entry` supplied by the caller.
    pub fn run_config(&self, entry: impl Into<String>) -> Result<RunConfig> {
        let mut config =
            RunConfig::new(entry, self.run.concurrency).stop_on_error(self.run.stop_on_error);
        if let Some(timeout) = self.run_timeout()? {
            config = config.with_timeout(timeout);
        }
        Ok(config)
    }

    /// The model invoker described by `[model]`, or one that always fails
    /// when no command is configured.
    pub fn model_invoker(&self) -> Arc<dyn ModelInvoker> {
        match &self.model.command {
            Some(program) => {
                let mut invoker =
                    CommandModelInvoker::new(program.clone()).with_args(self.model.args.clone());
                if let Some(flag) = &self.model.model_flag {
                    invoker = invoker.with_model_flag(flag.clone());
                }
                Arc::new(invoker)
            }
            None => Arc::new(DisabledModel),
        }
    }

    /// Turn every `[task.<name>]` into a [`TaskDefinition`], in name order.
    pub fn task_definitions(&self) -> Result<Vec<TaskDefinition>> {
        self.task
            .iter()
            .map(|(name, task)| build_definition(name, task))
            .collect()
    }
}

fn build_definition(name: &str, task: &TaskConfig) -> Result<TaskDefinition> {
    let captures = compile_captures(name, &task.capture)?;

    let body: Arc<dyn Task> = if let Some(cmd) = &task.cmd {
        Arc::new(
            ShellTask::new(parse_template(name, cmd)?)
                .with_output(task.output.clone())
                .with_captures(captures),
        )
    } else {
        let inline = task
            .prompt
            .as_deref()
            .map(|prompt| parse_template(name, prompt))
            .transpose()?;
        let source = PromptSource {
            inline,
            file: task.prompt_file.as_ref().map(PathBuf::from),
        };
        Arc::new(
            PromptTask::new(source)
                .with_model(task.model.clone())
                .with_output(task.output.clone())
                .with_captures(captures),
        )
    };

    let mut definition = TaskDefinition::new(name, body).depends_on(task.after.iter().cloned());

    if let Some(timeout) = parse_optional(task.timeout.as_deref(), &format!("task '{name}' timeout"))? {
        definition = definition.with_timeout(timeout);
    }

    if task.retries > 0 {
        let backoff = parse_optional(
            task.retry_backoff.as_deref(),
            &format!("task '{name}' retry_backoff"),
        )?
        .unwrap_or(Duration::ZERO);
        definition = definition.with_retry(RetryPolicy::new(task.retries.saturating_add(1), backoff));
    }

    Ok(definition)
}

pub(crate) fn parse_template(task: &str, raw: &str) -> Result<Template> {
    Template::parse(raw).map_err(|e| DagError::ConfigError(format!("task '{task}': {e:#}")))
}

/// Capture patterns run in multi-line mode, so `^` and `$` match at line
/// boundaries.
pub(crate) fn compile_captures(
    task: &str,
    capture: &BTreeMap<String, String>,
) -> Result<Vec<(String, Regex)>> {
    capture
        .iter()
        .map(|(artifact, pattern)| {
            RegexBuilder::new(pattern)
                .multi_line(true)
                .build()
                .map(|re| (artifact.clone(), re))
                .map_err(|e| {
                    DagError::ConfigError(format!(
                        "task '{task}' capture '{artifact}' is not a valid regex: {e}"
                    ))
                })
        })
        .collect()
}

pub(crate) fn parse_optional(value: Option<&str>, what: &str) -> Result<Option<Duration>> {
    value
        .map(|s| parse_duration(s).map_err(|e| DagError::ConfigError(format!("{what}: {e}"))))
        .transpose()
}
