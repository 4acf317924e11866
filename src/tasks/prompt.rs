// src/tasks/prompt.rs

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use regex::Regex;
use tracing::debug;

use crate::context::TaskContext;
use crate::dag::Task;
use crate::tasks::template::Template;
use crate::tasks::{apply_captures, write_output};
use crate::types::{Artifacts, BoxFuture};

/// Where a prompt comes from. The file part, if any, is read at run time and
/// placed before the inline part.
#[derive(Debug, Clone, Default)]
pub struct PromptSource {
    pub inline: Option<Template>,
    pub file: Option<PathBuf>,
}

/// Sends a rendered prompt to the model.
///
/// Artifacts: `prompt` (as sent), `response`, configured captures and
/// `output` when the response is written to a file.
#[derive(Debug, Clone)]
pub struct PromptTask {
    source: PromptSource,
    model: Option<String>,
    output: Option<PathBuf>,
    captures: Vec<(String, Regex)>,
}

impl PromptTask {
    pub fn new(source: PromptSource) -> Self {
        Self {
            source,
            model: None,
            output: None,
            captures: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_output(mut self, output: Option<impl Into<PathBuf>>) -> Self {
        self.output = output.map(Into::into);
        self
    }

    pub fn with_captures(mut self, captures: Vec<(String, Regex)>) -> Self {
        self.captures = captures;
        self
    }

    async fn build_prompt(&self, ctx: &dyn TaskContext) -> Result<String> {
        let mut prompt = String::new();

        if let Some(file) = &self.source.file {
            let text = ctx.read_file(file).await?;
            let template = Template::parse(&text)
                .with_context(|| format!("prompt file {}", file.display()))?;
            prompt.push_str(template.render(ctx)?.trim_end());
        }

        if let Some(inline) = &self.source.inline {
            if !prompt.is_empty() {
                prompt.push_str("\n\n");
            }
            prompt.push_str(&inline.render(ctx)?);
        }

        if prompt.trim().is_empty() {
            bail!("prompt is empty");
        }
        Ok(prompt)
    }

    async fn run(&self, ctx: Arc<dyn TaskContext>) -> Result<Artifacts> {
        let prompt = self.build_prompt(ctx.as_ref()).await?;
        debug!(
            task = %ctx.task_id(),
            model = ?self.model,
            prompt_len = prompt.len(),
            "invoking model"
        );

        let response = ctx.invoke_model(&prompt, self.model.as_deref()).await?;

        let mut artifacts = Artifacts::new();
        apply_captures(ctx.task_id(), &self.captures, &response, &mut artifacts);
        if let Some(path) = &self.output {
            write_output(ctx.as_ref(), path, &response, &mut artifacts).await?;
        }
        artifacts.insert("prompt".to_string(), prompt);
        artifacts.insert("response".to_string(), response);

        Ok(artifacts)
    }
}

impl Task for PromptTask {
    fn execute<'a>(&'a self, ctx: Arc<dyn TaskContext>) -> BoxFuture<'a, Result<Artifacts>> {
        Box::pin(self.run(ctx))
    }
}
