// src/tasks/shell.rs

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use regex::Regex;
use tracing::debug;

use crate::context::TaskContext;
use crate::dag::Task;
use crate::tasks::template::Template;
use crate::tasks::{apply_captures, write_output};
use crate::types::{Artifacts, BoxFuture};

/// Runs a shell command through the task context.
///
/// Artifacts: `stdout`, `stderr` (trailing whitespace trimmed), `exit_code`,
/// any configured captures and `output` when the stdout is written to a file.
/// A non-zero exit status fails the task.
#[derive(Debug, Clone)]
pub struct ShellTask {
    command: Template,
    output: Option<PathBuf>,
    captures: Vec<(String, Regex)>,
}

impl ShellTask {
    pub fn new(command: Template) -> Self {
        Self {
            command,
            output: None,
            captures: Vec::new(),
        }
    }

    pub fn with_output(mut self, output: Option<impl Into<PathBuf>>) -> Self {
        self.output = output.map(Into::into);
        self
    }

    pub fn with_captures(mut self, captures: Vec<(String, Regex)>) -> Self {
        self.captures = captures;
        self
    }

    async fn run(&self, ctx: Arc<dyn TaskContext>) -> Result<Artifacts> {
        let command = self.command.render(ctx.as_ref())?;
        debug!(task = %ctx.task_id(), %command, "running shell task");

        let out = ctx.run_shell_command(&command).await?;
        if !out.success() {
            let stderr = out.stderr.trim();
            if stderr.is_empty() {
                bail!("command exited with code {}", out.exit_code);
            }
            bail!("command exited with code {}: {}", out.exit_code, stderr);
        }

        let mut artifacts = Artifacts::new();
        artifacts.insert("stdout".to_string(), out.stdout.trim_end().to_string());
        artifacts.insert("stderr".to_string(), out.stderr.trim_end().to_string());
        artifacts.insert("exit_code".to_string(), out.exit_code.to_string());
        apply_captures(ctx.task_id(), &self.captures, &out.stdout, &mut artifacts);

        if let Some(path) = &self.output {
            write_output(ctx.as_ref(), path, &out.stdout, &mut artifacts).await?;
        }

        Ok(artifacts)
    }
}

impl Task for ShellTask {
    fn execute<'a>(&'a self, ctx: Arc<dyn TaskContext>) -> BoxFuture<'a, Result<Artifacts>> {
        Box::pin(self.run(ctx))
    }
}
