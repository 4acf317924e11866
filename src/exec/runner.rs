// src/exec/runner.rs

//! Runs one task body at the dispatch boundary.

use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use chrono::Utc;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::context::TaskContext;
use crate::dag::TaskDefinition;
use crate::types::{Artifacts, TaskOutput};

/// Run a task body to a terminal [`TaskOutput`].
///
/// - Errors returned by the body (and per-attempt timeouts) never escape;
///   they become a `failed` output carrying the error chain.
/// - With a retry policy the body is attempted up to `max_attempts` times,
///   sleeping with exponential backoff in between.
pub async fn run_task(definition: Arc<TaskDefinition>, ctx: Arc<dyn TaskContext>) -> TaskOutput {
    let policy = definition.retry.unwrap_or_default();
    let max_attempts = policy.attempts();

    let started_at = Utc::now();
    let start = Instant::now();

    info!(task = %definition.id, "starting task");

    let mut last_error = String::new();
    for attempt in 1..=max_attempts {
        match run_attempt(&definition, Arc::clone(&ctx)).await {
            Ok(artifacts) => {
                let duration_ms = elapsed_ms(start);
                info!(
                    task = %definition.id,
                    attempt,
                    duration_ms,
                    "task completed"
                );
                return TaskOutput::success(
                    definition.id.clone(),
                    artifacts,
                    started_at,
                    duration_ms,
                    attempt,
                );
            }
            Err(err) => {
                last_error = format!("{err:#}");
                if attempt < max_attempts {
                    let delay = policy.delay_after(attempt);
                    warn!(
                        task = %definition.id,
                        attempt,
                        max_attempts,
                        error = %last_error,
                        delay_ms = delay.as_millis() as u64,
                        "task attempt failed; retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    let duration_ms = elapsed_ms(start);
    warn!(
        task = %definition.id,
        attempts = max_attempts,
        duration_ms,
        error = %last_error,
        "task failed"
    );
    TaskOutput::failed(
        definition.id.clone(),
        last_error,
        started_at,
        duration_ms,
        max_attempts,
    )
}

async fn run_attempt(
    definition: &TaskDefinition,
    ctx: Arc<dyn TaskContext>,
) -> anyhow::Result<Artifacts> {
    let body = definition.body.execute(ctx);

    match definition.timeout {
        Some(limit) => match timeout(limit, body).await {
            Ok(result) => result,
            Err(_) => {
                debug!(task = %definition.id, ?limit, "task attempt hit its timeout");
                Err(anyhow!("task timed out after {:?}", limit))
            }
        },
        None => body.await,
    }
}

pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
