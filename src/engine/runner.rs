// src/engine/runner.rs

//! The concurrent execution engine for one invocation.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dag::TaskGraph;
use crate::engine::policy::{ResolvedHandler, RunPolicy};
use crate::engine::state::{RunState, RunStateKind, StateTable};
use crate::errors::{DagatherError, Result, TaskError, CANCELLED_TAG};
use crate::exec::{spawn_task, LaunchedTask};
use crate::registry::{Registry, TaskContext};
use crate::result::{DagatherResult, TaskOutcome};
use crate::siblings::SiblingTasks;
use crate::types::{CancellationMode, FailureAction, TaskName, TaskValue};

/// Events consumed by the runner loop.
///
/// - the executor reports `TaskFinished` / `TaskCancelled`
/// - the sibling handle sends `CancelTask` / `CancelRun`
/// - the deadline watchdog sends `RunTimedOut`
#[derive(Debug)]
pub(crate) enum RunnerEvent {
    TaskFinished {
        task: TaskName,
        outcome: std::result::Result<TaskValue, TaskError>,
    },
    TaskCancelled {
        task: TaskName,
    },
    CancelTask {
        task: TaskName,
    },
    CancelRun,
    RunTimedOut,
}

/// Executes one validated graph to completion.
///
/// All state transitions, in-degree decrements, and launch decisions happen
/// on this loop; task bodies only ever talk back through the event channel,
/// so the decrement-and-launch check-then-act is serialized by construction.
pub(crate) struct Runner<'a> {
    registry: &'a Registry,
    graph: TaskGraph,
    policy: RunPolicy,
    table: StateTable,
    /// Currently running units of work, by task name.
    active: HashMap<TaskName, LaunchedTask>,
    events_tx: mpsc::Sender<RunnerEvent>,
    events_rx: mpsc::Receiver<RunnerEvent>,
    siblings: SiblingTasks,
    /// First unhandled propagating failure; set once, never replaced.
    controlling: Option<DagatherError>,
    /// First task whose failure (or cancellation) triggered a teardown.
    first_failed: Option<TaskName>,
    aborted: bool,
    watchdog: Option<JoinHandle<()>>,
}

impl<'a> Runner<'a> {
    pub fn new(registry: &'a Registry, graph: TaskGraph, policy: RunPolicy) -> Self {
        let (events_tx, events_rx) = mpsc::channel::<RunnerEvent>(64);
        let table = StateTable::new(&graph);
        let siblings = SiblingTasks::new(table.shared(), events_tx.clone());

        Self {
            registry,
            graph,
            policy,
            table,
            active: HashMap::new(),
            events_tx,
            events_rx,
            siblings,
            controlling: None,
            first_failed: None,
            aborted: false,
            watchdog: None,
        }
    }

    /// Main event loop. Runs until every task has reached a terminal state.
    pub async fn run(mut self) -> Result<DagatherResult> {
        info!(tasks = self.graph.len(), "run started");

        if let Some(timeout) = self.policy.timeout {
            let tx = self.events_tx.clone();
            self.watchdog = Some(tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                let _ = tx.send(RunnerEvent::RunTimedOut).await;
            }));
        }

        // Seed: every task with no predecessors launches immediately.
        let roots: Vec<TaskName> = self.graph.roots().map(|s| s.to_string()).collect();
        for root in roots {
            self.launch(root);
        }

        while !self.table.all_terminal() {
            let Some(event) = self.events_rx.recv().await else {
                // Unreachable: the runner holds a sender for its own channel.
                break;
            };
            debug!(?event, "runner received event");

            match event {
                RunnerEvent::TaskFinished { task, outcome } => match outcome {
                    Ok(value) => self.handle_success(task, value),
                    Err(error) => self.handle_failure(task, error),
                },
                RunnerEvent::TaskCancelled { task } => self.handle_cancelled(task),
                RunnerEvent::CancelTask { task } => self.handle_cancel_request(task),
                RunnerEvent::CancelRun => self.handle_run_cancel("cancel_run"),
                RunnerEvent::RunTimedOut => self.handle_run_cancel("timeout"),
            }
        }

        if let Some(watchdog) = self.watchdog.take() {
            watchdog.abort();
        }

        self.finish()
    }

    /// Launch a task whose predecessors are all completed.
    fn launch(&mut self, name: TaskName) {
        let registry = self.registry;
        let Some(spec) = registry.get(&name) else {
            // Graph and registry are built from the same snapshot.
            warn!(task = %name, "task missing from registry; discarding");
            self.table.discard(&name);
            return;
        };

        let mut inputs: HashMap<TaskName, TaskValue> = HashMap::new();
        for dep in self.graph.dependencies_of(&name) {
            if let Some(value) = self.table.completed_value(dep) {
                inputs.insert(dep.clone(), value);
            }
        }

        self.table.mark_ready(&name);
        debug!(task = %name, "predecessors satisfied; launching");
        self.table.mark_running(&name);

        let ctx = TaskContext {
            inputs,
            siblings: self.siblings.clone(),
        };
        let launched = spawn_task(
            name.clone(),
            spec.work.clone(),
            ctx,
            self.events_tx.clone(),
        );
        self.active.insert(name, launched);
    }

    fn handle_success(&mut self, task: TaskName, value: TaskValue) {
        self.active.remove(&task);

        if !self.table.complete(&task, value) {
            // Already settled by a teardown; keep the first outcome.
            debug!(task = %task, "late completion ignored");
            return;
        }
        info!(task = %task, "task completed");
        self.advance_dependents(&task);
    }

    /// Decrement each direct dependent's unresolved-predecessor count and
    /// launch the ones that just became ready.
    fn advance_dependents(&mut self, task: &str) {
        let dependents: Vec<TaskName> = self.graph.dependents_of(task).to_vec();
        for dep in dependents {
            if self.table.is_terminal(&dep) {
                // Discarded earlier by another predecessor's outcome.
                continue;
            }
            if self.table.decrement_unresolved(&dep) == 0 {
                if self.table.deps_completed(&self.graph, &dep) {
                    self.launch(dep);
                } else {
                    // A non-completed predecessor discards its dependents the
                    // moment it settles, so reaching this point means the
                    // bookkeeping is out of sync.
                    warn!(task = %dep, "unresolved count at zero without completed predecessors");
                    self.table.discard_transitively(&self.graph, &dep);
                }
            }
        }
    }

    fn handle_failure(&mut self, task: TaskName, error: TaskError) {
        self.active.remove(&task);

        // Per-task handlers replace the run-level map for this task.
        let handler = {
            let map = self
                .registry
                .get(&task)
                .and_then(|spec| spec.handlers.as_ref())
                .unwrap_or(&self.policy.handlers);
            map.resolve(error.tags())
        };

        match handler {
            Some(ResolvedHandler::Recover(recover)) => {
                let value = recover(&error);
                info!(task = %task, "failure recovered by handler");
                if self.table.complete(&task, value) {
                    self.advance_dependents(&task);
                }
            }
            Some(ResolvedHandler::Propagate(mode)) => {
                self.record_failure(task, error, FailureAction::Propagate, mode);
            }
            Some(ResolvedHandler::Continue(mode)) => {
                self.record_failure(task, error, FailureAction::Continue, mode);
            }
            None => {
                let action = self.policy.action;
                let mode = self.policy.cancellation;
                self.record_failure(task, error, action, mode);
            }
        }
    }

    fn record_failure(
        &mut self,
        task: TaskName,
        error: TaskError,
        action: FailureAction,
        mode: CancellationMode,
    ) {
        let controlling_error = DagatherError::TaskFailed {
            task: task.clone(),
            error: error.clone(),
        };

        if !self.table.fail(&task, error) {
            debug!(task = %task, "late failure ignored");
            return;
        }
        warn!(task = %task, "task failed");

        self.settle(task, action, mode, controlling_error);
    }

    /// A running task observed its cancellation. Dispatches through the same
    /// machinery as a failure, under the reserved tag, so an explicit handler
    /// can intercept it; unmatched it follows the policy default.
    fn handle_cancelled(&mut self, task: TaskName) {
        self.active.remove(&task);

        let tags = vec![CANCELLED_TAG.to_string()];
        let handler = {
            let map = self
                .registry
                .get(&task)
                .and_then(|spec| spec.handlers.as_ref())
                .unwrap_or(&self.policy.handlers);
            map.resolve(&tags)
        };

        match handler {
            Some(ResolvedHandler::Recover(recover)) => {
                let error = TaskError::new(
                    CANCELLED_TAG,
                    anyhow::anyhow!("task '{task}' was cancelled"),
                );
                let value = recover(&error);
                info!(task = %task, "cancellation recovered by handler");
                if self.table.complete(&task, value) {
                    self.advance_dependents(&task);
                }
                return;
            }
            Some(ResolvedHandler::Propagate(mode)) => {
                if self.table.cancel(&task) {
                    info!(task = %task, "task cancelled");
                    self.settle(
                        task.clone(),
                        FailureAction::Propagate,
                        mode,
                        DagatherError::Cancelled(task),
                    );
                }
            }
            Some(ResolvedHandler::Continue(mode)) => {
                if self.table.cancel(&task) {
                    info!(task = %task, "task cancelled");
                    self.settle(
                        task.clone(),
                        FailureAction::Continue,
                        mode,
                        DagatherError::Cancelled(task),
                    );
                }
            }
            None => {
                if self.table.cancel(&task) {
                    info!(task = %task, "task cancelled");
                    let action = self.policy.action;
                    let mode = self.policy.cancellation;
                    self.settle(
                        task.clone(),
                        action,
                        mode,
                        DagatherError::Cancelled(task),
                    );
                }
            }
        }
    }

    /// Common failure path: discard successors, then apply the cancellation
    /// scope and record the controlling error — unless a teardown is already
    /// in progress, in which case the first failure's scope stands.
    fn settle(
        &mut self,
        task: TaskName,
        action: FailureAction,
        mode: CancellationMode,
        error: DagatherError,
    ) {
        // Successors can never run once a predecessor did not complete.
        self.table.discard_transitively(&self.graph, &task);

        if self.first_failed.is_none() {
            self.first_failed = Some(task.clone());
        }

        if self.controlling.is_some() {
            debug!(task = %task, "teardown already in progress; scope unchanged");
            return;
        }

        match mode {
            CancellationMode::DiscardChildren => {}
            CancellationMode::DiscardNotStarted => {
                self.discard_unstarted();
            }
            CancellationMode::CancelAll => {
                self.discard_unstarted();
                self.cancel_running();
            }
        }

        if matches!(action, FailureAction::Propagate) {
            self.controlling = Some(error);
        }
    }

    /// A cancellation request from the sibling handle.
    fn handle_cancel_request(&mut self, task: TaskName) {
        match self.table.kind_of(&task) {
            Some(RunStateKind::Running) => {
                if let Some(active) = self.active.get_mut(&task) {
                    if active.request_cancel() {
                        debug!(task = %task, "cancellation requested for running task");
                    }
                }
                // `Cancelled` is recorded once the interruption is observed.
            }
            Some(RunStateKind::Pending) | Some(RunStateKind::Ready) => {
                debug!(task = %task, "cancelling a waiting task; discarding it and its dependents");
                self.table.discard_transitively(&self.graph, &task);
            }
            _ => {
                debug!(task = %task, "cancel request for terminal or unknown task; ignoring");
            }
        }
    }

    /// Cancel the whole run: manual request or timeout, same path.
    fn handle_run_cancel(&mut self, reason: &'static str) {
        if self.controlling.is_some() {
            debug!(reason, "run cancellation during teardown; ignoring");
            return;
        }
        warn!(reason, "run cancelled");

        self.discard_unstarted();
        self.cancel_running();

        if matches!(self.policy.action, FailureAction::Propagate) {
            self.controlling = Some(DagatherError::RunCancelled);
        }
    }

    fn discard_unstarted(&mut self) {
        let discarded = self.table.discard_all_unstarted();
        if !discarded.is_empty() {
            debug!(count = discarded.len(), "discarded all unstarted tasks");
        }
        self.aborted = true;
    }

    fn cancel_running(&mut self) {
        for (name, task) in self.active.iter_mut() {
            if task.request_cancel() {
                debug!(task = %name, "cancellation requested");
            }
        }
    }

    /// Freeze the outcome snapshot and settle the invocation.
    fn finish(mut self) -> Result<DagatherResult> {
        let mut outcomes: BTreeMap<TaskName, TaskOutcome> = BTreeMap::new();
        for (name, state) in self.table.snapshot() {
            let outcome = match state {
                RunState::Completed(value) => TaskOutcome::Completed(value),
                RunState::Failed(error) => TaskOutcome::Failed(error),
                RunState::Discarded => TaskOutcome::Discarded,
                RunState::Cancelled => TaskOutcome::Cancelled,
                other => {
                    // The loop only exits once every task is terminal.
                    warn!(task = %name, state = ?other.kind(), "non-terminal state at completion");
                    TaskOutcome::Discarded
                }
            };
            outcomes.insert(name, outcome);
        }

        let result = DagatherResult::new(outcomes, self.aborted, self.first_failed.take());

        match self.controlling.take() {
            Some(error) => {
                info!(error = %error, "run aborted; re-raising controlling error");
                Err(error)
            }
            None => {
                info!("run complete");
                Ok(result)
            }
        }
    }
}
