#![allow(dead_code)]

use std::sync::Arc;

use tokio::sync::mpsc;

use dagrun::context::ContextFactory;
use dagrun::engine::SchedulerEvent;
use dagrun::{Runtime, TaskDefinition};

pub use dagrun_test_utils::builders::{failing_task, ok_task, sleepy_task};
pub use dagrun_test_utils::fake_context::FakeContextFactory;
pub use dagrun_test_utils::recorder::{Behaviour, Recorder};
pub use dagrun_test_utils::{init_tracing, with_timeout};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Runtime over a [`FakeContextFactory`], so no test touches the host.
pub fn runtime(definitions: Vec<TaskDefinition>) -> Runtime {
    runtime_with(definitions, FakeContextFactory::new())
}

pub fn runtime_with(definitions: Vec<TaskDefinition>, factory: FakeContextFactory) -> Runtime {
    let factory: Arc<dyn ContextFactory> = Arc::new(factory);
    Runtime::new(definitions, factory).expect("valid test graph")
}

/// Everything currently buffered on an event receiver.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<SchedulerEvent>) -> Vec<SchedulerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Task-level events as `"kind:id"` strings, in emission order.
pub fn task_event_trace(events: &[SchedulerEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| {
            let kind = match event {
                SchedulerEvent::StatusChange(_) => return None,
                SchedulerEvent::TaskStarted { .. } => "started",
                SchedulerEvent::TaskCompleted(_) => "completed",
                SchedulerEvent::TaskFailed(_) => "failed",
                SchedulerEvent::TaskSkipped(_) => "skipped",
            };
            event.task_id().map(|id| format!("{kind}:{id}"))
        })
        .collect()
}
