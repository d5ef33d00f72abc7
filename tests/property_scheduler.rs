use std::collections::HashSet;

use proptest::prelude::*;
use serde_json::Value;

use dagather::{Dagather, RunPolicy, TaskError, TaskOutcome};
use dagather_test_utils::builders::ExecLog;

// Strategy to generate a valid DAG as dependency lists.
// Acyclicity is guaranteed by only allowing task N to depend on tasks 0..N-1.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks),
            num_tasks,
        )
        .prop_map(|raw_deps| {
            raw_deps
                .into_iter()
                .enumerate()
                .map(|(i, potential)| {
                    // Sanitize dependencies: only allow deps < i.
                    let mut valid: HashSet<usize> = HashSet::new();
                    for dep in potential {
                        if i > 0 {
                            valid.insert(dep % i);
                        }
                    }
                    valid.into_iter().collect()
                })
                .collect()
        })
    })
}

fn task_name(i: usize) -> String {
    format!("task_{i}")
}

/// Build a dagather from dependency lists; tasks in `failing` fail, the rest
/// record start/done entries and complete.
fn build_dag(deps: &[Vec<usize>], failing: &HashSet<usize>, log: &ExecLog) -> Dagather {
    let mut dag = Dagather::with_policy(RunPolicy::continue_result());

    for (i, task_deps) in deps.iter().enumerate() {
        let name = task_name(i);
        let dep_names: Vec<String> = task_deps.iter().map(|d| task_name(*d)).collect();
        let dep_refs: Vec<&str> = dep_names.iter().map(|s| s.as_str()).collect();

        let log = log.clone();
        let fails = failing.contains(&i);
        let task = name.clone();
        dag.add(&name, &dep_refs, move |_ctx| {
            let log = log.clone();
            let task = task.clone();
            async move {
                log.record(&format!("start:{task}"));
                tokio::task::yield_now().await;
                if fails {
                    return Err(TaskError::new("boom", anyhow::anyhow!("{task} exploded")));
                }
                log.record(&format!("done:{task}"));
                Ok(Value::Null)
            }
        })
        .expect("generated names are unique");
    }

    dag
}

/// Expected outcome per task, walked in index order (deps always have lower
/// indices): completed if all deps completed and the task does not fail,
/// failed if it fails with all deps completed, discarded otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expected {
    Completed,
    Failed,
    Discarded,
}

fn expected_outcomes(deps: &[Vec<usize>], failing: &HashSet<usize>) -> Vec<Expected> {
    let mut expected = Vec::with_capacity(deps.len());
    for (i, task_deps) in deps.iter().enumerate() {
        let deps_ok = task_deps.iter().all(|d| expected[*d] == Expected::Completed);
        let e = if !deps_ok {
            Expected::Discarded
        } else if failing.contains(&i) {
            Expected::Failed
        } else {
            Expected::Completed
        };
        expected.push(e);
    }
    expected
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn every_task_reaches_exactly_one_terminal_state(
        deps in dag_strategy(10),
        failing_indices in proptest::collection::vec(0..10usize, 0..4),
    ) {
        let failing: HashSet<usize> = failing_indices
            .into_iter()
            .filter(|i| *i < deps.len())
            .collect();
        let log = ExecLog::new();
        let dag = build_dag(&deps, &failing, &log);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("failed to build runtime");
        let result = runtime
            .block_on(async {
                tokio::time::timeout(std::time::Duration::from_secs(5), dag.call()).await
            })
            .expect("run did not terminate")
            .expect("continuing policy never fails the caller");

        // Terminal coverage: one outcome per registered task, nothing more.
        prop_assert_eq!(result.len(), deps.len());

        let expected = expected_outcomes(&deps, &failing);
        for (i, want) in expected.iter().enumerate() {
            let name = task_name(i);
            let got = result.outcome(&name);
            let ok = match (want, got) {
                (Expected::Completed, Some(TaskOutcome::Completed(_))) => true,
                (Expected::Failed, Some(TaskOutcome::Failed(_))) => true,
                (Expected::Discarded, Some(TaskOutcome::Discarded)) => true,
                _ => false,
            };
            prop_assert!(ok, "task {} expected {:?}, got {:?}", name, want, got);
        }

        let any_failed = expected.iter().any(|e| *e == Expected::Failed);
        prop_assert_eq!(result.failed_task().is_some(), any_failed);
        prop_assert!(!result.aborted());

        // Launch ordering: for every edge (u, v), if v started at all it did
        // so strictly after u completed.
        let entries = log.entries();
        let index_of = |entry: &str| entries.iter().position(|e| e == entry);
        for (i, task_deps) in deps.iter().enumerate() {
            let started = index_of(&format!("start:{}", task_name(i)));
            let Some(start) = started else { continue };
            for d in task_deps {
                let done = index_of(&format!("done:{}", task_name(*d)));
                prop_assert!(
                    matches!(done, Some(done) if done < start),
                    "task_{} launched before task_{} completed",
                    i,
                    d
                );
            }
        }
    }
}
