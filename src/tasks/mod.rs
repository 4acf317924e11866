// src/tasks/mod.rs

//! Task bodies built from the task file.
//!
//! Both kinds go through the [`TaskContext`] only, so they run the same way
//! against the host and against test contexts.

use std::path::Path;

use anyhow::Result;
use regex::Regex;
use tracing::warn;

use crate::context::TaskContext;
use crate::types::Artifacts;

pub mod prompt;
pub mod shell;
pub mod template;

pub use prompt::{PromptSource, PromptTask};
pub use shell::ShellTask;
pub use template::Template;

/// Add one artifact per capture: the first group if the pattern has one,
/// otherwise the whole match. Patterns that do not match add nothing.
pub(crate) fn apply_captures(
    task: &str,
    captures: &[(String, Regex)],
    text: &str,
    artifacts: &mut Artifacts,
) {
    for (name, re) in captures {
        let value = re
            .captures(text)
            .and_then(|caps| caps.get(1).or_else(|| caps.get(0)))
            .map(|m| m.as_str().to_string());

        match value {
            Some(value) => {
                artifacts.insert(name.clone(), value);
            }
            None => warn!(task, capture = %name, "capture pattern did not match"),
        }
    }
}

/// Write `content` to `path` and record the path as the `output` artifact.
pub(crate) async fn write_output(
    ctx: &dyn TaskContext,
    path: &Path,
    content: &str,
    artifacts: &mut Artifacts,
) -> Result<()> {
    ctx.write_file(path, content).await?;
    artifacts.insert("output".to_string(), path.display().to_string());
    Ok(())
}
