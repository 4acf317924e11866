mod common;
use crate::common::{ok_task, Behaviour, Recorder};

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use proptest::prelude::*;

use dagrun::{Artifacts, NodeStatus, RunConfig, Runtime, Scheduler, TaskDefinition, TaskOutput};

/// A random acyclic graph: task `i` may only depend on tasks `0..i`.
#[derive(Debug, Clone)]
struct DagCase {
    deps: Vec<BTreeSet<usize>>,
    failing: BTreeSet<usize>,
    entry: usize,
    concurrency: usize,
}

impl DagCase {
    fn name(i: usize) -> String {
        format!("t{i:02}")
    }

    fn dep_names(&self, i: usize) -> Vec<String> {
        self.deps[i].iter().map(|&d| Self::name(d)).collect()
    }

    /// Entry plus everything it transitively depends on.
    fn members(&self) -> BTreeSet<usize> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![self.entry];
        while let Some(i) = stack.pop() {
            if seen.insert(i) {
                stack.extend(self.deps[i].iter().copied());
            }
        }
        seen
    }

    /// Terminal status each member must end in: skipped when any dependency
    /// did not complete, otherwise failed or completed by the failing set.
    fn expected(&self) -> HashMap<usize, NodeStatus> {
        let mut expected = HashMap::new();
        for i in self.members() {
            let blocked = self.deps[i]
                .iter()
                .any(|d| expected.get(d) != Some(&NodeStatus::Completed));
            let status = if blocked {
                NodeStatus::Skipped
            } else if self.failing.contains(&i) {
                NodeStatus::Failed
            } else {
                NodeStatus::Completed
            };
            expected.insert(i, status);
        }
        expected
    }
}

fn dag_case_strategy(max_tasks: usize) -> impl Strategy<Value = DagCase> {
    (1..=max_tasks).prop_flat_map(|n| {
        (
            proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), n),
            proptest::collection::btree_set(0..n, 0..=n / 3),
            0..n,
            1..=4usize,
        )
            .prop_map(move |(raw, failing, entry, concurrency)| {
                let deps = raw
                    .into_iter()
                    .enumerate()
                    .map(|(i, picks)| {
                        if i == 0 {
                            BTreeSet::new()
                        } else {
                            picks.into_iter().map(|p| p % i).collect()
                        }
                    })
                    .collect();
                DagCase {
                    deps,
                    failing,
                    entry,
                    concurrency,
                }
            })
    })
}

fn definitions(case: &DagCase) -> Vec<TaskDefinition> {
    (0..case.deps.len())
        .map(|i| {
            let deps = case.dep_names(i);
            let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
            ok_task(&DagCase::name(i), &deps)
        })
        .collect()
}

proptest! {
    /// Drives the pure scheduler, finishing running tasks oldest first.
    #[test]
    fn scheduler_runs_are_ordered_total_and_isolated(case in dag_case_strategy(12)) {
        let mut scheduler = Scheduler::new(definitions(&case)).expect("acyclic by construction");
        let entry = DagCase::name(case.entry);
        scheduler.start_run(&entry).expect("entry exists");

        let members = case.members();
        let mut running: VecDeque<String> = VecDeque::new();
        let mut peak = 0;

        loop {
            scheduler.step();
            while running.len() < case.concurrency {
                let Some(id) = scheduler.next_ready() else { break };
                for dep in scheduler.graph().dependencies_of(&id) {
                    prop_assert_eq!(scheduler.status_of(dep), Some(NodeStatus::Completed));
                }
                prop_assert!(scheduler.mark_running(&id).is_some());
                running.push_back(id);
            }
            peak = peak.max(running.len());
            prop_assert_eq!(scheduler.run_status().running_task_ids.len(), running.len());

            let Some(task) = running.pop_front() else { break };
            let index: usize = task[1..].parse().expect("generated name");
            let output = if case.failing.contains(&index) {
                TaskOutput::failed(task.as_str(), "boom", Utc::now(), 0, 1)
            } else {
                TaskOutput::success(task.as_str(), Artifacts::new(), Utc::now(), 0, 1)
            };
            prop_assert!(scheduler.complete(output).is_some());
        }

        // Nothing may be left behind for the sweep.
        prop_assert!(scheduler.sweep("never ready").is_empty());
        let status = scheduler.finish();
        prop_assert!(peak <= case.concurrency);
        prop_assert!(scheduler.is_idle());

        prop_assert_eq!(status.total_tasks, members.len());
        prop_assert_eq!(status.outputs.len(), members.len());
        prop_assert_eq!(
            status.completed_tasks + status.failed_tasks + status.skipped_tasks(),
            status.total_tasks
        );

        let expected = case.expected();
        for i in 0..case.deps.len() {
            let name = DagCase::name(i);
            match expected.get(&i) {
                Some(want) => prop_assert_eq!(scheduler.status_of(&name), Some(*want), "{}", name),
                None => {
                    prop_assert_eq!(scheduler.status_of(&name), Some(NodeStatus::Pending));
                    prop_assert!(status.output(&name).is_none());
                }
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Same properties through the async runtime with real sleeps.
    #[test]
    fn runtime_respects_the_concurrency_bound(case in dag_case_strategy(8)) {
        let recorder = Recorder::new();
        let defs: Vec<TaskDefinition> = (0..case.deps.len())
            .map(|i| {
                let deps = case.dep_names(i);
                let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
                let behaviour = if case.failing.contains(&i) {
                    Behaviour::Fail(Duration::from_millis(2), "boom".to_string())
                } else {
                    Behaviour::Succeed(Duration::from_millis(2))
                };
                recorder.task_with(&DagCase::name(i), &deps, behaviour)
            })
            .collect();

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("tokio runtime");
        let factory = Arc::new(common::FakeContextFactory::new());
        let mut runtime = Runtime::new(defs, factory).expect("acyclic by construction");
        let config = RunConfig::new(DagCase::name(case.entry), case.concurrency);
        let status = rt
            .block_on(common::with_timeout(runtime.run(config)))
            .expect("valid run config");

        prop_assert!(recorder.max_concurrency() <= case.concurrency);
        prop_assert_eq!(recorder.running(), 0);

        let expected = case.expected();
        let started = recorder.started();
        for i in 0..case.deps.len() {
            let name = DagCase::name(i);
            let ran = started.contains(&name);
            match expected.get(&i) {
                Some(NodeStatus::Skipped) | None => prop_assert!(!ran, "{} should not run", name),
                Some(_) => {
                    prop_assert!(ran, "{} should run", name);
                    prop_assert_eq!(recorder.visible_deps(&name), case.dep_names(i));
                }
            }
            let want = expected.get(&i).copied().unwrap_or(NodeStatus::Pending);
            prop_assert_eq!(runtime.node_state(&name), Some(want));
        }
        prop_assert_eq!(status.outputs.len(), expected.len());
    }
}
