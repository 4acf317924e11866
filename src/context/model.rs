// src/context/model.rs

//! External language-model invocation.

use std::process::Stdio;

use anyhow::{anyhow, bail, Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::types::BoxFuture;

/// An opaque, possibly slow, possibly failing model call.
pub trait ModelInvoker: Send + Sync {
    fn invoke<'a>(&'a self, prompt: &'a str, model_hint: Option<&'a str>)
    -> BoxFuture<'a, Result<String>>;
}

/// Runs an AI command-line program, feeding the prompt on stdin and taking
/// its stdout as the answer.
///
/// With `program = "claude"`, `args = ["-p"]` and `model_flag = "--model"`,
/// a call with hint `sonnet` runs `claude -p --model sonnet < prompt`.
#[derive(Debug, Clone)]
pub struct CommandModelInvoker {
    program: String,
    args: Vec<String>,
    model_flag: Option<String>,
}

impl CommandModelInvoker {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            model_flag: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_model_flag(mut self, flag: impl Into<String>) -> Self {
        self.model_flag = Some(flag.into());
        self
    }

    async fn run(&self, prompt: &str, model_hint: Option<&str>) -> Result<String> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let (Some(flag), Some(hint)) = (&self.model_flag, model_hint) {
            cmd.arg(flag).arg(hint);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(program = %self.program, model = ?model_hint, "invoking model command");

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning model command '{}'", self.program))?;

        // Feed stdin while the output is drained, so a prompt larger than the
        // pipe buffer cannot stall both sides.
        let stdin = child.stdin.take();
        let program = self.program.as_str();
        let feed = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            match stdin.write_all(prompt.as_bytes()).await {
                Ok(()) => Ok(()),
                // The program exited without reading its input; its exit
                // status tells the rest.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!(program, "model command closed stdin early");
                    Ok(())
                }
                Err(e) => Err(e),
            }
            // Dropping stdin closes the pipe so the program sees EOF.
        };

        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        fed.context("writing prompt to model command")?;
        let output =
            output.with_context(|| format!("waiting for model command '{}'", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "model command '{}' exited with {}: {}",
                self.program,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }
}

impl ModelInvoker for CommandModelInvoker {
    fn invoke<'a>(
        &'a self,
        prompt: &'a str,
        model_hint: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.run(prompt, model_hint))
    }
}

/// Used when no model command is configured; every call fails.
#[derive(Debug, Clone, Default)]
pub struct DisabledModel;

impl ModelInvoker for DisabledModel {
    fn invoke<'a>(
        &'a self,
        _prompt: &'a str,
        _model_hint: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async { Err(anyhow!("no model command configured (set [model].command)")) })
    }
}
