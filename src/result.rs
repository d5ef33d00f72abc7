// src/result.rs

//! The outcome snapshot returned to the caller.

use std::collections::BTreeMap;

use crate::errors::TaskError;
use crate::types::{TaskName, TaskValue};

/// Terminal outcome of one task.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Completed(TaskValue),
    Failed(TaskError),
    /// Never ran: a predecessor failed, was cancelled, or the run aborted.
    Discarded,
    /// Was running and was interrupted.
    Cancelled,
}

impl TaskOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed(_))
    }

    pub fn value(&self) -> Option<&TaskValue> {
        match self {
            TaskOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&TaskError> {
        match self {
            TaskOutcome::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Immutable snapshot mapping every registered task to its terminal outcome,
/// plus run-level metadata. Built incrementally by the runner and frozen at
/// completion.
#[derive(Debug, Clone)]
pub struct DagatherResult {
    outcomes: BTreeMap<TaskName, TaskOutcome>,
    aborted: bool,
    failed_task: Option<TaskName>,
}

impl DagatherResult {
    pub(crate) fn new(
        outcomes: BTreeMap<TaskName, TaskOutcome>,
        aborted: bool,
        failed_task: Option<TaskName>,
    ) -> Self {
        Self {
            outcomes,
            aborted,
            failed_task,
        }
    }

    /// Outcome of the named task.
    pub fn outcome(&self, task: &str) -> Option<&TaskOutcome> {
        self.outcomes.get(task)
    }

    /// Output of the named task, if it completed.
    pub fn value(&self, task: &str) -> Option<&TaskValue> {
        self.outcomes.get(task).and_then(|o| o.value())
    }

    /// Completed outputs keyed by task name.
    pub fn values(&self) -> BTreeMap<TaskName, TaskValue> {
        self.outcomes
            .iter()
            .filter_map(|(name, outcome)| {
                outcome.value().map(|v| (name.clone(), v.clone()))
            })
            .collect()
    }

    /// True if the run stopped before every task had a chance to launch.
    pub fn aborted(&self) -> bool {
        self.aborted
    }

    /// The task whose failure (or cancellation) triggered the teardown.
    pub fn failed_task(&self) -> Option<&str> {
        self.failed_task.as_deref()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TaskName, &TaskOutcome)> {
        self.outcomes.iter()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}
