mod common;
use crate::common::{init_tracing, ok_task, runtime, FakeContextFactory, Recorder};

use std::sync::Arc;

use dagrun::errors::DagError;
use dagrun::{RunConfig, Runtime};

fn build_err(definitions: Vec<dagrun::TaskDefinition>) -> DagError {
    Runtime::new(definitions, Arc::new(FakeContextFactory::new())).unwrap_err()
}

#[test]
fn two_task_cycle_is_rejected_at_construction() {
    init_tracing();
    let recorder = Recorder::new();

    let err = build_err(vec![recorder.task("A", &["B"]), recorder.task("B", &["A"])]);

    match &err {
        DagError::DagCycle(path) => {
            assert!(path.contains("A -> B -> A") || path.contains("B -> A -> B"), "{path}");
        }
        other => panic!("expected a cycle error, got {other:?}"),
    }
    assert!(err.is_configuration());
    assert!(recorder.started().is_empty());
}

#[test]
fn cycle_behind_an_acyclic_prefix_is_found() {
    let err = build_err(vec![
        ok_task("root", &[]),
        ok_task("x", &["root", "z"]),
        ok_task("y", &["x"]),
        ok_task("z", &["y"]),
    ]);
    assert!(matches!(err, DagError::DagCycle(_)), "{err:?}");
}

#[test]
fn self_dependency_is_a_cycle() {
    let err = build_err(vec![ok_task("solo", &["solo"])]);
    assert!(matches!(err, DagError::DagCycle(_)));
}

#[test]
fn unknown_dependency_is_rejected() {
    let err = build_err(vec![ok_task("a", &[]), ok_task("b", &["ghost"])]);
    match err {
        DagError::UnknownDependency { task, dependency } => {
            assert_eq!(task, "b");
            assert_eq!(dependency, "ghost");
        }
        other => panic!("expected unknown dependency, got {other:?}"),
    }
}

#[test]
fn duplicate_id_is_rejected() {
    let err = build_err(vec![ok_task("a", &[]), ok_task("a", &[])]);
    assert!(matches!(err, DagError::DuplicateTask(ref id) if id == "a"));
}

#[tokio::test]
async fn unknown_entry_is_reported_before_anything_runs() {
    let recorder = Recorder::new();
    let mut rt = runtime(vec![recorder.task("a", &[])]);

    let err = rt.run(RunConfig::new("nope", 1)).await.unwrap_err();

    assert!(matches!(err, DagError::TaskNotFound(ref id) if id == "nope"));
    assert!(recorder.started().is_empty());
    assert!(rt.scheduler().is_idle());
}

#[tokio::test]
async fn zero_concurrency_is_invalid() {
    let mut rt = runtime(vec![ok_task("a", &[])]);
    let err = rt.run(RunConfig::new("a", 0)).await.unwrap_err();
    assert!(matches!(err, DagError::InvalidRunConfig(_)));
}
