// src/lib.rs

//! A dependency-aware task orchestrator.
//!
//! Register named async units of work together with the names of the tasks
//! they depend on, then invoke the collection once. Tasks run concurrently;
//! each one starts the instant all of its predecessors have completed, and
//! completed outputs are threaded into dependents as named inputs. The
//! invocation returns a [`DagatherResult`] mapping every task to its
//! terminal outcome, governed by a per-run [`RunPolicy`] that decides what
//! happens to the rest of the graph when a task fails.
//!
//! ```
//! use dagather::Dagather;
//! use serde_json::json;
//!
//! # async fn demo() -> dagather::Result<()> {
//! let mut dag = Dagather::new();
//! dag.add("fetch", &[], |_ctx| async { Ok(json!(41)) })?;
//! dag.add("bump", &["fetch"], |ctx| async move {
//!     let n = ctx.input("fetch").and_then(|v| v.as_i64()).unwrap_or(0);
//!     Ok(json!(n + 1))
//! })?;
//!
//! let result = dag.call().await?;
//! assert_eq!(result.value("bump"), Some(&json!(42)));
//! # Ok(())
//! # }
//! ```

pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod registry;
pub mod result;
pub mod siblings;
pub mod types;

use std::future::Future;

use tracing::debug;

pub use crate::dag::{build_graph, TaskGraph};
pub use crate::engine::{Handler, HandlerMap, PolicyConfig, RecoverFn, RunPolicy, RunStateKind};
pub use crate::errors::{DagatherError, Result, TaskError, CANCELLED_TAG, PANIC_TAG};
pub use crate::registry::{work_fn, Registry, TaskContext, TaskFuture, TaskSpec, WorkFn};
pub use crate::result::{DagatherResult, TaskOutcome};
pub use crate::siblings::SiblingTasks;
pub use crate::types::{CancellationMode, FailureAction, TaskName, TaskValue};

use crate::engine::runner::Runner;

/// A collection of registered tasks plus the default policy for running
/// them.
///
/// The registry is reusable: the graph is rebuilt and revalidated on every
/// invocation, and no per-run state survives between calls.
pub struct Dagather {
    registry: Registry,
    default_policy: RunPolicy,
}

impl Dagather {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            default_policy: RunPolicy::default(),
        }
    }

    /// Use `policy` for invocations that do not supply their own.
    pub fn with_policy(policy: RunPolicy) -> Self {
        Self {
            registry: Registry::new(),
            default_policy: policy,
        }
    }

    /// Register a task from an async closure.
    ///
    /// `deps` names the tasks whose outputs this task consumes; forward
    /// references are legal since resolution happens at build time. Fails
    /// with [`DagatherError::DuplicateTask`] if the name is taken.
    pub fn add<F, Fut>(&mut self, name: &str, deps: &[&str], work: F) -> Result<()>
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<TaskValue, TaskError>> + Send + 'static,
    {
        self.add_spec(TaskSpec::new(name, deps, work_fn(work)))
    }

    /// Register a fully-specified task (prebuilt work fn, custom handlers).
    pub fn add_spec(&mut self, spec: TaskSpec) -> Result<()> {
        self.registry.add(spec)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Build, validate, and run the whole collection under the default
    /// policy.
    pub async fn call(&self) -> Result<DagatherResult> {
        self.call_with(self.default_policy.clone()).await
    }

    /// Build, validate, and run the whole collection under `policy`.
    ///
    /// Construction-time errors (unknown dependency, cycle) fail the
    /// invocation before any task runs. Task-time failures are governed by
    /// the policy: a propagating policy re-raises the controlling error, a
    /// continuing one always returns the result.
    pub async fn call_with(&self, policy: RunPolicy) -> Result<DagatherResult> {
        let graph = dag::build_graph(&self.registry)?;
        debug!(tasks = graph.len(), "graph validated");

        Runner::new(&self.registry, graph, policy).run().await
    }
}

impl Default for Dagather {
    fn default() -> Self {
        Self::new()
    }
}
