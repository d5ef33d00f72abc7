#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use serde_json::Value;

use dagather::{Dagather, RunPolicy, RunStateKind, SiblingTasks, TaskError};

/// Shared, ordered log of task executions.
#[derive(Clone, Default)]
pub struct ExecLog(Arc<Mutex<Vec<String>>>);

impl ExecLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: &str) {
        self.0.lock().unwrap().push(entry.to_string());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.0.lock().unwrap().iter().any(|e| e == entry)
    }

    /// Position of the first occurrence of `entry`, if any.
    pub fn index_of(&self, entry: &str) -> Option<usize> {
        self.0.lock().unwrap().iter().position(|e| e == entry)
    }
}

/// Builder over [`Dagather`] for the task shapes tests use over and over.
///
/// Builder methods panic on duplicate names; registration errors are a test
/// bug, not a scenario.
pub struct DagBuilder {
    dag: Dagather,
}

impl DagBuilder {
    pub fn new() -> Self {
        Self {
            dag: Dagather::new(),
        }
    }

    pub fn with_policy(policy: RunPolicy) -> Self {
        Self {
            dag: Dagather::with_policy(policy),
        }
    }

    /// Task returning a fixed value.
    pub fn value_task(mut self, name: &str, deps: &[&str], value: Value) -> Self {
        self.dag
            .add(name, deps, move |_ctx| {
                let value = value.clone();
                async move { Ok(value) }
            })
            .expect("duplicate task name in builder");
        self
    }

    /// Task that fails with the given tag and message.
    pub fn failing_task(mut self, name: &str, deps: &[&str], tag: &str, message: &str) -> Self {
        let tag = tag.to_string();
        let message = message.to_string();
        self.dag
            .add(name, deps, move |_ctx| {
                let tag = tag.clone();
                let message = message.clone();
                async move { Err(TaskError::new(tag, anyhow!(message))) }
            })
            .expect("duplicate task name in builder");
        self
    }

    /// Task that appends its name to the log and returns null.
    pub fn recording_task(mut self, name: &str, deps: &[&str], log: &ExecLog) -> Self {
        let log = log.clone();
        let task = name.to_string();
        self.dag
            .add(name, deps, move |_ctx| {
                let log = log.clone();
                let task = task.clone();
                async move {
                    log.record(&task);
                    Ok(Value::Null)
                }
            })
            .expect("duplicate task name in builder");
        self
    }

    /// Like [`recording_task`](Self::recording_task), but sleeps first.
    pub fn slow_recording_task(
        mut self,
        name: &str,
        deps: &[&str],
        log: &ExecLog,
        millis: u64,
    ) -> Self {
        let log = log.clone();
        let task = name.to_string();
        self.dag
            .add(name, deps, move |_ctx| {
                let log = log.clone();
                let task = task.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(millis)).await;
                    log.record(&task);
                    Ok(Value::Null)
                }
            })
            .expect("duplicate task name in builder");
        self
    }

    /// Task that records `start:<name>` and `done:<name>` around a yield,
    /// for launch-ordering assertions.
    pub fn traced_task(mut self, name: &str, deps: &[&str], log: &ExecLog) -> Self {
        let log = log.clone();
        let task = name.to_string();
        self.dag
            .add(name, deps, move |_ctx| {
                let log = log.clone();
                let task = task.clone();
                async move {
                    log.record(&format!("start:{task}"));
                    tokio::task::yield_now().await;
                    log.record(&format!("done:{task}"));
                    Ok(Value::Null)
                }
            })
            .expect("duplicate task name in builder");
        self
    }

    pub fn build(self) -> Dagather {
        self.dag
    }
}

impl Default for DagBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll the sibling handle until `task` reaches `kind`.
pub async fn wait_for_state(siblings: &SiblingTasks, task: &str, kind: RunStateKind) {
    loop {
        if siblings.state_of(task) == Some(kind) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
