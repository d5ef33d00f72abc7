// src/siblings.rs

//! Introspection and cooperative cancellation for running tasks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

use crate::engine::runner::RunnerEvent;
use crate::engine::state::{RunState, RunStateKind};
use crate::types::{TaskName, TaskValue};

/// Handle passed into every running task's [`TaskContext`](crate::registry::TaskContext).
///
/// Exposes the current state of any task in the run and lets a task ask the
/// runner to cancel a sibling or the whole run. Cancellation is cooperative:
/// a running target is interrupted at its own suspension points, a waiting
/// target is discarded along with its dependents. The handle never outlives
/// its invocation; requests sent after the run drains are dropped.
#[derive(Clone)]
pub struct SiblingTasks {
    states: Arc<Mutex<HashMap<TaskName, RunState>>>,
    control: mpsc::Sender<RunnerEvent>,
}

impl SiblingTasks {
    pub(crate) fn new(
        states: Arc<Mutex<HashMap<TaskName, RunState>>>,
        control: mpsc::Sender<RunnerEvent>,
    ) -> Self {
        Self { states, control }
    }

    /// Current state of the named task, if it exists in this run.
    pub fn state_of(&self, task: &str) -> Option<RunStateKind> {
        self.states.lock().unwrap().get(task).map(|s| s.kind())
    }

    /// Output of the named task, if it has completed.
    pub fn value_of(&self, task: &str) -> Option<TaskValue> {
        match self.states.lock().unwrap().get(task) {
            Some(RunState::Completed(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Ask the runner to cancel the named task.
    ///
    /// A running target receives a cooperative interruption; a waiting one
    /// is discarded together with its dependents. Terminal targets are left
    /// alone.
    pub async fn cancel(&self, task: &str) {
        debug!(task = %task, "sibling cancellation requested");
        let _ = self
            .control
            .send(RunnerEvent::CancelTask {
                task: task.to_string(),
            })
            .await;
    }

    /// Ask the runner to cancel the whole run.
    pub async fn cancel_run(&self) {
        debug!("whole-run cancellation requested");
        let _ = self.control.send(RunnerEvent::CancelRun).await;
    }
}
