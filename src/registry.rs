// src/registry.rs

//! The task registry: named units of work plus their declared dependencies.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::engine::policy::HandlerMap;
use crate::errors::{DagatherError, Result, TaskError};
use crate::siblings::SiblingTasks;
use crate::types::{TaskName, TaskValue};

/// Future returned by a unit of work.
pub type TaskFuture =
    Pin<Box<dyn Future<Output = std::result::Result<TaskValue, TaskError>> + Send>>;

/// A unit of work: an async function from its execution context to a value.
pub type WorkFn = Arc<dyn Fn(TaskContext) -> TaskFuture + Send + Sync>;

/// Everything a running task receives from the orchestrator.
///
/// `inputs` holds the completed output of every declared dependency, keyed
/// by task name; it is empty for root tasks. `siblings` is the
/// per-invocation introspection/cancellation handle.
#[derive(Clone)]
pub struct TaskContext {
    pub inputs: HashMap<TaskName, TaskValue>,
    pub siblings: SiblingTasks,
}

impl TaskContext {
    /// Output of the named dependency.
    pub fn input(&self, name: &str) -> Option<&TaskValue> {
        self.inputs.get(name)
    }
}

/// Wrap an async closure as a [`WorkFn`].
pub fn work_fn<F, Fut>(f: F) -> WorkFn
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<TaskValue, TaskError>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// A registered task: name, work, and the ordered names of its
/// dependencies. Immutable once registered.
#[derive(Clone)]
pub struct TaskSpec {
    pub name: TaskName,
    pub deps: Vec<TaskName>,
    pub work: WorkFn,
    /// Optional handler map replacing the run policy's handlers for this
    /// task's failures.
    pub handlers: Option<HandlerMap>,
}

impl TaskSpec {
    pub fn new(name: &str, deps: &[&str], work: WorkFn) -> Self {
        Self {
            name: name.to_string(),
            deps: deps.iter().map(|d| d.to_string()).collect(),
            work,
            handlers: None,
        }
    }

    pub fn with_handlers(mut self, handlers: HandlerMap) -> Self {
        self.handlers = Some(handlers);
        self
    }
}

/// Holds the declared tasks.
///
/// Registration order does not matter; forward references are resolved when
/// the graph is built, so a task may list dependencies that are registered
/// later. Reusable across invocations.
#[derive(Clone, Default)]
pub struct Registry {
    tasks: BTreeMap<TaskName, TaskSpec>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. Fails if the name is already taken.
    pub fn add(&mut self, spec: TaskSpec) -> Result<()> {
        if self.tasks.contains_key(&spec.name) {
            return Err(DagatherError::DuplicateTask(spec.name));
        }
        debug!(task = %spec.name, deps = ?spec.deps, "task registered");
        self.tasks.insert(spec.name.clone(), spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&TaskSpec> {
        self.tasks.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskSpec> {
        self.tasks.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
