use std::error::Error;

use serde_json::Value;

use dagather::{Dagather, DagatherError};
use dagather_test_utils::builders::{DagBuilder, ExecLog};
use dagather_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn two_task_cycle_fails_at_build_time() -> TestResult {
    init_tracing();

    let mut dag = Dagather::new();
    dag.add("a", &["b"], |_ctx| async { Ok(Value::Null) })?;
    dag.add("b", &["a"], |_ctx| async { Ok(Value::Null) })?;

    let err = with_timeout(dag.call()).await.unwrap_err();
    match err {
        DagatherError::Cycle { path } => {
            assert_eq!(path.first(), path.last());
            assert!(path.iter().any(|n| n == "a"));
            assert!(path.iter().any(|n| n == "b"));
            assert_eq!(path.len(), 3);
        }
        other => panic!("expected CycleError, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn self_dependency_is_a_cycle() -> TestResult {
    init_tracing();

    let mut dag = Dagather::new();
    dag.add("a", &["a"], |_ctx| async { Ok(Value::Null) })?;

    let err = with_timeout(dag.call()).await.unwrap_err();
    match err {
        DagatherError::Cycle { path } => assert_eq!(path, vec!["a", "a"]),
        other => panic!("expected CycleError, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn unknown_dependency_fails_at_build_time() -> TestResult {
    init_tracing();

    let mut dag = Dagather::new();
    dag.add("b", &["missing"], |_ctx| async { Ok(Value::Null) })?;

    let err = with_timeout(dag.call()).await.unwrap_err();
    match err {
        DagatherError::UnknownDependency { task, missing } => {
            assert_eq!(task, "b");
            assert_eq!(missing, "missing");
        }
        other => panic!("expected UnknownDependencyError, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn nothing_runs_when_construction_fails() -> TestResult {
    init_tracing();
    let log = ExecLog::new();

    // A perfectly runnable task next to a cycle: the build error must stop
    // the whole invocation before anything launches.
    let mut dag = DagBuilder::new().recording_task("ok", &[], &log).build();
    dag.add("x", &["y"], |_ctx| async { Ok(Value::Null) })?;
    dag.add("y", &["x"], |_ctx| async { Ok(Value::Null) })?;

    let err = with_timeout(dag.call()).await.unwrap_err();
    assert!(matches!(err, DagatherError::Cycle { .. }));
    assert!(log.entries().is_empty());
    Ok(())
}

#[tokio::test]
async fn longer_cycle_reports_full_path() -> TestResult {
    init_tracing();

    let mut dag = Dagather::new();
    dag.add("a", &["c"], |_ctx| async { Ok(Value::Null) })?;
    dag.add("b", &["a"], |_ctx| async { Ok(Value::Null) })?;
    dag.add("c", &["b"], |_ctx| async { Ok(Value::Null) })?;
    // An innocent bystander outside the cycle.
    dag.add("d", &["a"], |_ctx| async { Ok(Value::Null) })?;

    let err = with_timeout(dag.call()).await.unwrap_err();
    match err {
        DagatherError::Cycle { path } => {
            assert_eq!(path.first(), path.last());
            assert_eq!(path.len(), 4);
            for name in ["a", "b", "c"] {
                assert!(path.iter().any(|n| n == name), "missing {name} in {path:?}");
            }
            assert!(!path.iter().any(|n| n == "d"));
        }
        other => panic!("expected CycleError, got {other:?}"),
    }
    Ok(())
}
