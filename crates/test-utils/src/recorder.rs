use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dagrun::types::Artifacts;
use dagrun::{task_fn, TaskDefinition};

/// What a recorded task body does once started.
#[derive(Debug, Clone)]
pub enum Behaviour {
    Succeed(Duration),
    Fail(Duration, String),
    /// Fail on the first `n` attempts, then succeed.
    FailTimes(usize, String),
    Panic(String),
    /// Never finishes on its own.
    Hang,
}

#[derive(Debug, Default)]
struct Inner {
    running: usize,
    max_running: usize,
    started: Vec<String>,
    finished: Vec<String>,
    /// Dependency ids each start could see through its context.
    visible_deps: Vec<(String, Vec<String>)>,
}

/// Shared log of task starts and finishes plus the peak number of bodies
/// running at the same time.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    inner: Arc<Mutex<Inner>>,
}

/// Decrements the running count when the body ends, including on abort or
/// panic.
struct RunningGuard {
    inner: Arc<Mutex<Inner>>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.running -= 1;
    }
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// A recorded task that succeeds after 10ms.
    pub fn task(&self, id: &str, deps: &[&str]) -> TaskDefinition {
        self.task_with(id, deps, Behaviour::Succeed(Duration::from_millis(10)))
    }

    pub fn task_with(&self, id: &str, deps: &[&str], behaviour: Behaviour) -> TaskDefinition {
        let recorder = self.clone();
        let name = id.to_string();
        let deps_owned: Vec<String> = deps.iter().map(|d| d.to_string()).collect();
        let attempts = Arc::new(Mutex::new(0usize));

        let body = task_fn(move |ctx| {
            let recorder = recorder.clone();
            let name = name.clone();
            let behaviour = behaviour.clone();
            let attempts = Arc::clone(&attempts);
            let visible: Vec<String> = deps_owned
                .iter()
                .filter(|d| ctx.get_dependency_output(d.as_str()).is_ok())
                .cloned()
                .collect();

            async move {
                let _guard = recorder.enter(&name, visible);
                let attempt = {
                    let mut n = attempts.lock().unwrap_or_else(|e| e.into_inner());
                    *n += 1;
                    *n
                };

                match behaviour {
                    Behaviour::Succeed(delay) => tokio::time::sleep(delay).await,
                    Behaviour::Fail(delay, message) => {
                        tokio::time::sleep(delay).await;
                        recorder.lock().finished.push(name.clone());
                        anyhow::bail!(message);
                    }
                    Behaviour::FailTimes(n, message) if attempt <= n => {
                        recorder.lock().finished.push(name.clone());
                        anyhow::bail!("{message} (attempt {attempt})");
                    }
                    Behaviour::FailTimes(..) => {}
                    Behaviour::Panic(message) => panic!("{message}"),
                    Behaviour::Hang => std::future::pending::<()>().await,
                }

                recorder.lock().finished.push(name.clone());
                Ok(Artifacts::from([
                    ("id".to_string(), name),
                    ("attempt".to_string(), attempt.to_string()),
                ]))
            }
        });

        TaskDefinition::new(id, body).depends_on(deps.iter().copied())
    }

    fn enter(&self, name: &str, visible: Vec<String>) -> RunningGuard {
        let mut inner = self.lock();
        inner.running += 1;
        inner.max_running = inner.max_running.max(inner.running);
        inner.started.push(name.to_string());
        inner.visible_deps.push((name.to_string(), visible));
        RunningGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Task ids in the order their bodies started (one entry per attempt).
    pub fn started(&self) -> Vec<String> {
        self.lock().started.clone()
    }

    /// Task ids in the order their bodies returned (one entry per attempt).
    pub fn finished(&self) -> Vec<String> {
        self.lock().finished.clone()
    }

    pub fn start_count(&self, id: &str) -> usize {
        self.lock().started.iter().filter(|s| *s == id).count()
    }

    pub fn max_concurrency(&self) -> usize {
        self.lock().max_running
    }

    pub fn running(&self) -> usize {
        self.lock().running
    }

    /// Direct dependencies that had a successful output visible when `id`
    /// last started.
    pub fn visible_deps(&self, id: &str) -> Vec<String> {
        self.lock()
            .visible_deps
            .iter()
            .rev()
            .find(|(name, _)| name == id)
            .map(|(_, deps)| deps.clone())
            .unwrap_or_default()
    }
}
