// src/dag/task.rs

//! Task definitions supplied by the caller.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::context::TaskContext;
use crate::types::{Artifacts, BoxFuture, TaskId};

/// The work body of a task.
///
/// The scheduler knows nothing about what a task does; it only calls
/// `execute` once per attempt with a fresh [`TaskContext`] and records the
/// result. Any error returned here (or a panic) becomes a `failed` output.
pub trait Task: Send + Sync {
    fn execute<'a>(&'a self, ctx: Arc<dyn TaskContext>) -> BoxFuture<'a, anyhow::Result<Artifacts>>;
}

/// Adapter turning an async closure into a [`Task`].
pub struct FnTask<F> {
    f: F,
}

impl<F, Fut> Task for FnTask<F>
where
    F: Fn(Arc<dyn TaskContext>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Artifacts>> + Send + 'static,
{
    fn execute<'a>(&'a self, ctx: Arc<dyn TaskContext>) -> BoxFuture<'a, anyhow::Result<Artifacts>> {
        Box::pin((self.f)(ctx))
    }
}

/// Wrap an async closure as a shareable task body.
///
/// ```ignore
/// let body = task_fn(|ctx| async move {
///     let out = ctx.run_shell_command("cargo build").await?;
///     Ok(Artifacts::from([("stdout".into(), out.stdout)]))
/// });
/// ```
pub fn task_fn<F, Fut>(f: F) -> Arc<dyn Task>
where
    F: Fn(Arc<dyn TaskContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Artifacts>> + Send + 'static,
{
    Arc::new(FnTask { f })
}

/// Retry behaviour for a task body.
///
/// `max_attempts` counts every attempt including the first one; values below
/// 1 are treated as 1. The delay before attempt `n + 1` is
/// `backoff * 2^(n - 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Total number of attempts the runner will make.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.backoff.saturating_mul(1u32 << exp)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }
}

/// A named unit of work plus its declared dependencies.
///
/// Immutable once handed to the scheduler.
#[derive(Clone)]
pub struct TaskDefinition {
    pub id: TaskId,
    /// Ids that must complete successfully before this task may run.
    /// Ordered, without duplicates.
    pub depends_on: Vec<TaskId>,
    pub body: Arc<dyn Task>,
    pub retry: Option<RetryPolicy>,
    pub timeout: Option<Duration>,
}

impl TaskDefinition {
    pub fn new(id: impl Into<TaskId>, body: Arc<dyn Task>) -> Self {
        Self {
            id: id.into(),
            depends_on: Vec::new(),
            body,
            retry: None,
            timeout: None,
        }
    }

    /// Append dependencies, keeping first-seen order and dropping repeats.
    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        for dep in deps {
            let dep = dep.into();
            if !self.depends_on.contains(&dep) {
                self.depends_on.push(dep);
            }
        }
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("id", &self.id)
            .field("depends_on", &self.depends_on)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depends_on_keeps_order_and_drops_repeats() {
        let def = TaskDefinition::new("x", task_fn(|_| async { Ok(Artifacts::new()) }))
            .depends_on(["b", "a", "b"])
            .depends_on(["c", "a"]);
        assert_eq!(def.depends_on, vec!["b", "a", "c"]);
    }

    #[test]
    fn retry_backoff_doubles() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100));
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
    }

    #[test]
    fn zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts(), 1);
    }
}
