// src/tasks/template.rs

//! `{{task.artifact}}` placeholders resolved from dependency outputs.

use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;

use crate::context::TaskContext;

const PLACEHOLDER: &str = r"\{\{\s*([^{}\s]+)\s*\}\}";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Text(String),
    Ref { task: String, artifact: String },
}

/// A string with `{{task.artifact}}` references to dependency artifacts.
///
/// The reference is split at its last `.`, so task ids may contain dots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    parts: Vec<Part>,
}

impl Template {
    pub fn parse(raw: &str) -> Result<Self> {
        let re = Regex::new(PLACEHOLDER).context("compiling placeholder pattern")?;

        let mut parts = Vec::new();
        let mut last = 0;
        for caps in re.captures_iter(raw) {
            let (Some(whole), Some(reference)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() > last {
                parts.push(Part::Text(raw[last..whole.start()].to_string()));
            }

            let reference = reference.as_str();
            let (task, artifact) = reference
                .rsplit_once('.')
                .filter(|(t, a)| !t.is_empty() && !a.is_empty())
                .ok_or_else(|| {
                    anyhow!("placeholder '{{{{{reference}}}}}' must look like {{{{task.artifact}}}}")
                })?;
            parts.push(Part::Ref {
                task: task.to_string(),
                artifact: artifact.to_string(),
            });
            last = whole.end();
        }
        if last < raw.len() {
            parts.push(Part::Text(raw[last..].to_string()));
        }

        Ok(Self { parts })
    }

    /// Task ids referenced by placeholders, in order of appearance.
    pub fn referenced_tasks(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|part| match part {
            Part::Ref { task, .. } => Some(task.as_str()),
            Part::Text(_) => None,
        })
    }

    /// Substitute every placeholder with the artifact from the dependency's
    /// successful output.
    pub fn render(&self, ctx: &dyn TaskContext) -> Result<String> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Text(text) => out.push_str(text),
                Part::Ref { task, artifact } => {
                    let output = ctx.get_dependency_output(task)?;
                    let Some(value) = output.artifact(artifact) else {
                        bail!("dependency '{task}' produced no artifact '{artifact}'");
                    };
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}
