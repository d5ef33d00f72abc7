use std::error::Error;

use serde_json::{json, Value};

use dagather::{
    work_fn, CancellationMode, Dagather, DagatherError, Handler, HandlerMap, RunPolicy, TaskError,
    TaskOutcome, TaskSpec,
};
use dagather_test_utils::builders::{DagBuilder, ExecLog};
use dagather_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn recover_converts_failure_and_feeds_successors() -> TestResult {
    init_tracing();

    let policy = RunPolicy::propagate().on("flaky", Handler::recover(|_| json!("fallback")));

    let mut dag = DagBuilder::with_policy(policy)
        .failing_task("a", &[], "flaky", "a exploded")
        .build();

    dag.add("b", &["a"], |ctx| async move {
        Ok(ctx.input("a").cloned().unwrap_or(Value::Null))
    })?;

    let result = with_timeout(dag.call()).await?;

    assert_eq!(result.value("a"), Some(&json!("fallback")));
    assert_eq!(result.value("b"), Some(&json!("fallback")));
    assert!(!result.aborted());
    assert!(result.failed_task().is_none());
    Ok(())
}

#[tokio::test]
async fn most_specific_tag_wins() -> TestResult {
    init_tracing();

    // The error dispatches under ["timeout", "io"], most specific first.
    let mut dag = Dagather::with_policy(
        RunPolicy::propagate()
            .on("timeout", Handler::recover(|_| json!("timed out")))
            .on("io", Handler::recover(|_| json!("io trouble"))),
    );
    dag.add("a", &[], |_ctx| async {
        Err(TaskError::new("timeout", anyhow::anyhow!("deadline")).with_tag("io"))
    })?;

    let result = with_timeout(dag.call()).await?;
    assert_eq!(result.value("a"), Some(&json!("timed out")));
    Ok(())
}

#[tokio::test]
async fn broader_tag_matches_when_specific_is_absent() -> TestResult {
    init_tracing();

    let mut dag = Dagather::with_policy(
        RunPolicy::propagate().on("io", Handler::recover(|_| json!("io trouble"))),
    );
    dag.add("a", &[], |_ctx| async {
        Err(TaskError::new("timeout", anyhow::anyhow!("deadline")).with_tag("io"))
    })?;

    let result = with_timeout(dag.call()).await?;
    assert_eq!(result.value("a"), Some(&json!("io trouble")));
    Ok(())
}

#[tokio::test]
async fn nested_maps_resolve_recursively() -> TestResult {
    init_tracing();

    let nested = HandlerMap::new().on("timeout", Handler::recover(|_| json!("rescued")));
    let mut dag =
        Dagather::with_policy(RunPolicy::propagate().on("io", Handler::Nested(nested)));
    dag.add("a", &[], |_ctx| async {
        Err(TaskError::new("timeout", anyhow::anyhow!("deadline")).with_tag("io"))
    })?;

    let result = with_timeout(dag.call()).await?;
    assert_eq!(result.value("a"), Some(&json!("rescued")));
    Ok(())
}

#[tokio::test]
async fn nested_miss_falls_through_to_default() -> TestResult {
    init_tracing();

    // The nested map names a different tag, so resolution comes up empty and
    // the continuing default records the failure.
    let nested = HandlerMap::new().on("parse", Handler::recover(|_| json!("unused")));
    let mut dag =
        Dagather::with_policy(RunPolicy::continue_result().on("io", Handler::Nested(nested)));
    dag.add("a", &[], |_ctx| async {
        Err(TaskError::new("timeout", anyhow::anyhow!("deadline")).with_tag("io"))
    })?;

    let result = with_timeout(dag.call()).await?;
    assert!(matches!(result.outcome("a"), Some(TaskOutcome::Failed(_))));
    Ok(())
}

#[tokio::test]
async fn unmatched_tag_falls_through_to_default() -> TestResult {
    init_tracing();

    let dag = DagBuilder::with_policy(
        RunPolicy::propagate().on("parse", Handler::recover(|_| json!("unused"))),
    )
    .failing_task("a", &[], "io", "io trouble")
    .build();

    let err = with_timeout(dag.call()).await.unwrap_err();
    assert!(matches!(err, DagatherError::TaskFailed { task, .. } if task == "a"));
    Ok(())
}

#[tokio::test]
async fn per_task_handlers_replace_run_handlers() -> TestResult {
    init_tracing();
    let log = ExecLog::new();

    // The run policy would happily recover "flaky", but the task carries its
    // own map, which downgrades the failure to a recorded one instead.
    let policy = RunPolicy::propagate().on("flaky", Handler::recover(|_| json!("unused")));

    let mut dag = DagBuilder::with_policy(policy)
        .recording_task("b", &["a"], &log)
        .recording_task("d", &[], &log)
        .build();

    let spec = TaskSpec::new(
        "a",
        &[],
        work_fn(|_ctx| async {
            Err(TaskError::new("flaky", anyhow::anyhow!("a exploded")))
        }),
    )
    .with_handlers(
        HandlerMap::new().on("flaky", Handler::Continue(CancellationMode::DiscardChildren)),
    );
    dag.add_spec(spec)?;

    let result = with_timeout(dag.call()).await?;

    assert!(matches!(result.outcome("a"), Some(TaskOutcome::Failed(_))));
    assert!(matches!(result.outcome("b"), Some(TaskOutcome::Discarded)));
    assert!(matches!(result.outcome("d"), Some(TaskOutcome::Completed(_))));
    assert!(!log.entries().contains(&"b".to_string()));
    Ok(())
}

#[tokio::test]
async fn handler_can_downgrade_a_propagating_policy() -> TestResult {
    init_tracing();
    let log = ExecLog::new();

    let policy = RunPolicy::propagate().on(
        "flaky",
        Handler::Continue(CancellationMode::DiscardChildren),
    );

    let dag = DagBuilder::with_policy(policy)
        .failing_task("a", &[], "flaky", "a exploded")
        .recording_task("b", &["a"], &log)
        .slow_recording_task("d", &[], &log, 30)
        .build();

    let result = with_timeout(dag.call()).await?;

    assert!(matches!(result.outcome("a"), Some(TaskOutcome::Failed(_))));
    assert!(matches!(result.outcome("b"), Some(TaskOutcome::Discarded)));
    assert!(matches!(result.outcome("d"), Some(TaskOutcome::Completed(_))));
    assert!(!result.aborted());
    Ok(())
}

#[tokio::test]
async fn handler_can_escalate_a_continuing_policy() -> TestResult {
    init_tracing();

    let policy = RunPolicy::continue_result().on(
        "fatal",
        Handler::Propagate(CancellationMode::DiscardNotStarted),
    );

    let dag = DagBuilder::with_policy(policy)
        .failing_task("a", &[], "fatal", "unrecoverable")
        .slow_recording_task("b", &[], &ExecLog::new(), 30)
        .build();

    let err = with_timeout(dag.call()).await.unwrap_err();
    assert!(matches!(err, DagatherError::TaskFailed { task, .. } if task == "a"));
    Ok(())
}
