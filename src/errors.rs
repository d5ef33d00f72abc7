// src/errors.rs

//! Crate-wide error types.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::types::TaskName;

/// Reserved tag under which cancellations dispatch through handler maps.
pub const CANCELLED_TAG: &str = "cancelled";

/// Tag attached to failures captured from a panicking unit of work.
pub const PANIC_TAG: &str = "panic";

/// A captured failure from a single unit of work.
///
/// Carries the underlying error plus an ordered list of tags, most specific
/// first, used to match exception handlers. Cloneable so the same failure can
/// appear both in the result snapshot and in the error returned to the
/// caller.
#[derive(Clone)]
pub struct TaskError {
    tags: Vec<String>,
    source: Arc<anyhow::Error>,
}

impl TaskError {
    /// Wrap an error under a single tag.
    pub fn new(tag: impl Into<String>, source: anyhow::Error) -> Self {
        Self {
            tags: vec![tag.into()],
            source: Arc::new(source),
        }
    }

    /// Wrap an error with no tags; only the policy default can handle it.
    pub fn untagged(source: anyhow::Error) -> Self {
        Self {
            tags: Vec::new(),
            source: Arc::new(source),
        }
    }

    /// Append a broader tag. Handlers try tags in insertion order, so the
    /// most specific tag comes first.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// The tags this failure dispatches under, most specific first.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// The underlying error.
    pub fn inner(&self) -> &anyhow::Error {
        &self.source
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl fmt::Debug for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskError")
            .field("tags", &self.tags)
            .field("source", &self.source)
            .finish()
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref().as_ref())
    }
}

/// Errors surfaced to callers of the registry, builder, and invocation APIs.
///
/// The first three variants are construction-time: they fail the invocation
/// before any task runs. The rest report run-time outcomes under a
/// propagating policy.
#[derive(Error, Debug)]
pub enum DagatherError {
    #[error("duplicate task name '{0}'")]
    DuplicateTask(TaskName),

    #[error("task '{task}' depends on unknown task '{missing}'")]
    UnknownDependency { task: TaskName, missing: TaskName },

    #[error("dependency cycle: {}", .path.join(" -> "))]
    Cycle { path: Vec<TaskName> },

    #[error("task '{task}' failed: {error}")]
    TaskFailed { task: TaskName, error: TaskError },

    #[error("task '{0}' was cancelled")]
    Cancelled(TaskName),

    #[error("run was cancelled")]
    RunCancelled,
}

pub type Result<T> = std::result::Result<T, DagatherError>;
