mod common;
use crate::common::{
    drain, init_tracing, runtime, task_event_trace, with_timeout, Behaviour, Recorder, TestResult,
};

use std::time::Duration;

use dagrun::dag::DEPENDENCY_FAILED;
use dagrun::engine::runtime::{RUN_CANCELLED, RUN_TIMED_OUT};
use dagrun::{NodeStatus, OutputStatus, RetryPolicy, RunConfig, RunState, SchedulerEvent};

#[tokio::test]
async fn task_timeout_fails_only_that_task() -> TestResult {
    init_tracing();
    let recorder = Recorder::new();
    let slow = recorder
        .task_with("slow", &[], Behaviour::Hang)
        .with_timeout(Duration::from_millis(50));
    let mut rt = runtime(vec![
        slow,
        recorder.task("sibling", &[]),
        recorder.task("after", &["slow"]),
        recorder.task("end", &["after", "sibling"]),
    ]);

    let status = with_timeout(rt.run(RunConfig::new("end", 2))).await?;

    let slow = status.output("slow").expect("slow output");
    assert_eq!(slow.status, OutputStatus::Error);
    assert!(slow.error.as_deref().unwrap_or("").contains("timed out"), "{slow:?}");
    assert_eq!(rt.node_state("sibling"), Some(NodeStatus::Completed));
    assert_eq!(rt.node_state("after"), Some(NodeStatus::Skipped));
    assert_eq!(recorder.running(), 0);
    Ok(())
}

#[tokio::test]
async fn retries_until_success() -> TestResult {
    let recorder = Recorder::new();
    let flaky = recorder
        .task_with("flaky", &[], Behaviour::FailTimes(2, "transient".into()))
        .with_retry(RetryPolicy::new(3, Duration::from_millis(5)));
    let mut rt = runtime(vec![flaky, recorder.task("next", &["flaky"])]);

    let status = with_timeout(rt.run(RunConfig::new("next", 1))).await?;

    let flaky = status.output("flaky").expect("flaky output");
    assert_eq!(flaky.status, OutputStatus::Success);
    assert_eq!(flaky.attempts, 3);
    assert_eq!(flaky.artifact("attempt"), Some("3"));
    assert_eq!(recorder.start_count("flaky"), 3);
    assert_eq!(status.state, RunState::Completed);
    Ok(())
}

#[tokio::test]
async fn exhausted_retries_keep_the_last_error() -> TestResult {
    let recorder = Recorder::new();
    let flaky = recorder
        .task_with("flaky", &[], Behaviour::FailTimes(5, "transient".into()))
        .with_retry(RetryPolicy::new(2, Duration::ZERO));
    let mut rt = runtime(vec![flaky]);

    let status = with_timeout(rt.run(RunConfig::new("flaky", 1))).await?;

    let flaky = status.output("flaky").expect("flaky output");
    assert_eq!(flaky.status, OutputStatus::Error);
    assert_eq!(flaky.attempts, 2);
    assert_eq!(flaky.error.as_deref(), Some("transient (attempt 2)"));
    Ok(())
}

#[tokio::test]
async fn panicking_task_is_a_task_failure() -> TestResult {
    let recorder = Recorder::new();
    let mut rt = runtime(vec![
        recorder.task_with("panics", &[], Behaviour::Panic("kaboom".into())),
        recorder.task("fine", &[]),
        recorder.task("after", &["panics"]),
        recorder.task("end", &["after", "fine"]),
    ]);

    let status = with_timeout(rt.run(RunConfig::new("end", 2))).await?;

    let out = status.output("panics").expect("panics output");
    assert_eq!(out.status, OutputStatus::Error);
    assert_eq!(out.error.as_deref(), Some("task panicked: kaboom"));
    assert_eq!(rt.node_state("fine"), Some(NodeStatus::Completed));
    assert_eq!(
        status.output("after").and_then(|o| o.error.as_deref()),
        Some(DEPENDENCY_FAILED)
    );
    assert_eq!(status.failed_tasks, 1);
    Ok(())
}

#[tokio::test]
async fn run_timeout_aborts_in_flight_and_sweeps() -> TestResult {
    let recorder = Recorder::new();
    let mut rt = runtime(vec![
        recorder.task_with("stuck", &[], Behaviour::Hang),
        recorder.task("quick", &[]),
        recorder.task("queued", &[]),
        recorder.task("end", &["stuck", "quick", "queued"]),
    ]);

    let config = RunConfig::new("end", 2).with_timeout(Duration::from_millis(100));
    let status = with_timeout(rt.run(config)).await?;

    let stuck = status.output("stuck").expect("stuck output");
    assert_eq!(stuck.status, OutputStatus::Error);
    assert_eq!(stuck.error.as_deref(), Some(RUN_TIMED_OUT));

    // quick finished and freed its slot for queued before the deadline.
    assert_eq!(rt.node_state("quick"), Some(NodeStatus::Completed));
    assert_eq!(rt.node_state("queued"), Some(NodeStatus::Completed));
    assert_eq!(rt.node_state("end"), Some(NodeStatus::Skipped));
    assert_eq!(status.state, RunState::Failed);
    assert!(status.running_task_ids.is_empty());
    assert_eq!(recorder.running(), 0);
    assert!(rt.scheduler().is_idle());
    Ok(())
}

#[tokio::test]
async fn run_timeout_skips_never_dispatched_tasks() -> TestResult {
    let recorder = Recorder::new();
    let mut rt = runtime(vec![
        recorder.task_with("stuck", &[], Behaviour::Hang),
        recorder.task("behind", &[]),
        recorder.task("end", &["stuck", "behind"]),
    ]);

    let config = RunConfig::new("end", 1).with_timeout(Duration::from_millis(50));
    let status = with_timeout(rt.run(config)).await?;

    let behind = status.output("behind").expect("behind output");
    assert_eq!(behind.status, OutputStatus::Skipped);
    assert_eq!(behind.error.as_deref(), Some(RUN_TIMED_OUT));
    assert_eq!(recorder.start_count("behind"), 0);
    Ok(())
}

#[tokio::test]
async fn shutdown_signal_cancels_the_run() -> TestResult {
    let recorder = Recorder::new();
    let mut rt = runtime(vec![
        recorder.task_with("stuck", &[], Behaviour::Hang),
        recorder.task("end", &["stuck"]),
    ]);

    let shutdown = tokio::time::sleep(Duration::from_millis(50));
    let status = with_timeout(rt.run_until(RunConfig::new("end", 1), shutdown)).await?;

    assert_eq!(
        status.output("stuck").and_then(|o| o.error.as_deref()),
        Some(RUN_CANCELLED)
    );
    assert_eq!(rt.node_state("end"), Some(NodeStatus::Skipped));
    assert_eq!(status.state, RunState::Failed);

    // The runtime is usable again afterwards.
    let retry = RunConfig::new("stuck", 1).with_timeout(Duration::from_millis(20));
    let again = with_timeout(rt.run(retry)).await?;
    assert_eq!(again.total_tasks, 1);
    Ok(())
}

#[tokio::test]
async fn events_follow_the_run() -> TestResult {
    let recorder = Recorder::new();
    let mut rt = runtime(vec![
        recorder.task_with("bad", &[], Behaviour::Fail(Duration::ZERO, "nope".into())),
        recorder.task("child", &["bad"]),
    ]);
    let mut rx = rt.subscribe();
    let mut second = rt.subscribe();

    let status = with_timeout(rt.run(RunConfig::new("child", 1))).await?;
    let events = drain(&mut rx);

    assert_eq!(
        task_event_trace(&events),
        ["started:bad", "failed:bad", "skipped:child"]
    );

    match events.first() {
        Some(SchedulerEvent::StatusChange(s)) => {
            assert_eq!(s.state, RunState::Running);
            assert_eq!(s.total_tasks, 2);
        }
        other => panic!("first event should be a running status, got {other:?}"),
    }
    match events.last() {
        Some(SchedulerEvent::StatusChange(s)) => assert_eq!(s, &status),
        other => panic!("last event should be the final status, got {other:?}"),
    }

    // Every subscriber sees the same stream.
    assert_eq!(drain(&mut second).len(), events.len());
    Ok(())
}

#[tokio::test]
async fn dropped_subscriber_does_not_disturb_the_run() -> TestResult {
    let recorder = Recorder::new();
    let mut rt = runtime(vec![recorder.task("a", &[])]);
    drop(rt.subscribe());

    let status = with_timeout(rt.run(RunConfig::new("a", 1))).await?;
    assert_eq!(status.state, RunState::Completed);
    Ok(())
}

#[tokio::test]
async fn dropped_run_future_does_not_block_the_next_run() -> TestResult {
    let recorder = Recorder::new();
    let mut rt = runtime(vec![
        recorder.task_with("stuck", &[], Behaviour::Hang),
        recorder.task("a", &[]),
    ]);

    let dropped = tokio::time::timeout(
        Duration::from_millis(50),
        rt.run(RunConfig::new("stuck", 1)),
    )
    .await;
    assert!(dropped.is_err(), "the hanging run should have been cut off");

    let status = with_timeout(rt.run(RunConfig::new("a", 1))).await?;

    assert_eq!(status.state, RunState::Completed);
    assert_eq!(status.total_tasks, 1);
    assert_eq!(rt.node_state("stuck"), Some(NodeStatus::Failed));
    assert_eq!(recorder.running(), 0);
    assert!(rt.scheduler().is_idle());
    Ok(())
}
