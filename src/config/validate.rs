// src/config/validate.rs

use crate::config::model::{
    compile_captures, parse_optional, parse_template, ConfigFile, RawConfigFile,
};
use std::collections::HashSet;

use crate::errors::{DagError, Result};
use crate::tasks::Template;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = DagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.run, raw.model, raw.task))
    }
}

/// Check everything that can be checked without building the graph.
///
/// Unknown dependencies and cycles are left to the graph builder, which
/// reports them with the offending path.
pub fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_run_section(cfg)?;
    validate_tasks(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(DagError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_run_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.run.concurrency == 0 {
        return Err(DagError::ConfigError(
            "[run].concurrency must be >= 1 (got 0)".to_string(),
        ));
    }

    parse_optional(cfg.run.timeout.as_deref(), "[run].timeout")?;

    if let Some(entry) = &cfg.run.entry {
        if !cfg.task.contains_key(entry) {
            return Err(DagError::ConfigError(format!(
                "[run].entry '{entry}' does not name a task"
            )));
        }
    }

    Ok(())
}

fn validate_tasks(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in &cfg.task {
        match (task.is_shell(), task.is_prompt()) {
            (true, true) => {
                return Err(DagError::ConfigError(format!(
                    "task '{name}' sets both `cmd` and `prompt`/`prompt_file`; pick one"
                )));
            }
            (false, false) => {
                return Err(DagError::ConfigError(format!(
                    "task '{name}' needs one of `cmd`, `prompt` or `prompt_file`"
                )));
            }
            _ => {}
        }

        if task.is_shell() && task.model.is_some() {
            return Err(DagError::ConfigError(format!(
                "task '{name}' sets `model` but is not a prompt task"
            )));
        }

        for text in [&task.cmd, &task.prompt].into_iter().flatten() {
            let template = parse_template(name, text)?;
            check_references(cfg, name, &template)?;
        }
        compile_captures(name, &task.capture)?;
        parse_optional(task.timeout.as_deref(), &format!("task '{name}' timeout"))?;
        parse_optional(
            task.retry_backoff.as_deref(),
            &format!("task '{name}' retry_backoff"),
        )?;
    }
    Ok(())
}

/// Placeholders may only name tasks this one (transitively) runs after;
/// anything else could never be resolved at run time.
fn check_references(cfg: &RawConfigFile, name: &str, template: &Template) -> Result<()> {
    let mut upstream: Option<HashSet<&str>> = None;

    for referenced in template.referenced_tasks() {
        let upstream = upstream.get_or_insert_with(|| upstream_of(cfg, name));
        if !upstream.contains(referenced) {
            return Err(DagError::ConfigError(format!(
                "task '{name}' uses a placeholder for '{referenced}', \
                 which is not one of its dependencies (add it to `after`)"
            )));
        }
    }
    Ok(())
}

/// Every task reachable through `after` lists. Unknown names and cycles are
/// tolerated here; the graph builder reports them.
fn upstream_of<'c>(cfg: &'c RawConfigFile, name: &str) -> HashSet<&'c str> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = cfg
        .task
        .get(name)
        .map(|task| task.after.iter().map(String::as_str).collect())
        .unwrap_or_default();

    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        if let Some(task) = cfg.task.get(id) {
            stack.extend(task.after.iter().map(String::as_str));
        }
    }
    seen
}
