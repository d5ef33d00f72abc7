// src/engine/state.rs

//! Per-run task state bookkeeping.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::dag::TaskGraph;
use crate::errors::TaskError;
use crate::types::{TaskName, TaskValue};

/// Lifecycle of one task within one invocation.
///
/// Transitions are monotonic: `Pending -> Ready -> Running` followed by
/// exactly one of `Completed`/`Failed`/`Cancelled`, or `Pending`/`Ready`
/// -> `Discarded`.
#[derive(Debug, Clone)]
pub(crate) enum RunState {
    Pending,
    Ready,
    Running,
    Completed(TaskValue),
    Failed(TaskError),
    /// Never ran: a predecessor failed, was cancelled, or the run aborted.
    Discarded,
    /// Was running and the interruption has been observed.
    Cancelled,
}

impl RunState {
    pub fn kind(&self) -> RunStateKind {
        match self {
            RunState::Pending => RunStateKind::Pending,
            RunState::Ready => RunStateKind::Ready,
            RunState::Running => RunStateKind::Running,
            RunState::Completed(_) => RunStateKind::Completed,
            RunState::Failed(_) => RunStateKind::Failed,
            RunState::Discarded => RunStateKind::Discarded,
            RunState::Cancelled => RunStateKind::Cancelled,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed(_) | RunState::Failed(_) | RunState::Discarded | RunState::Cancelled
        )
    }
}

/// Copyable view of a task's state, exposed through
/// [`SiblingTasks`](crate::siblings::SiblingTasks).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStateKind {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    Discarded,
    Cancelled,
}

/// Per-run state table: the authoritative `RunState` map plus the count of
/// unresolved predecessors per task.
///
/// The map lives behind a mutex only so the sibling handle can read it from
/// inside task bodies; every write happens on the runner loop, which keeps
/// the decrement-and-launch sequence serialized.
pub(crate) struct StateTable {
    states: Arc<Mutex<HashMap<TaskName, RunState>>>,
    unresolved: HashMap<TaskName, usize>,
    terminal: usize,
    total: usize,
}

impl StateTable {
    pub fn new(graph: &TaskGraph) -> Self {
        let mut states = HashMap::new();
        let mut unresolved = HashMap::new();
        for name in graph.tasks() {
            states.insert(name.to_string(), RunState::Pending);
            unresolved.insert(name.to_string(), graph.dependencies_of(name).len());
        }
        let total = states.len();
        Self {
            states: Arc::new(Mutex::new(states)),
            unresolved,
            terminal: 0,
            total,
        }
    }

    /// Shared read-only mirror handed to the sibling handle.
    pub fn shared(&self) -> Arc<Mutex<HashMap<TaskName, RunState>>> {
        Arc::clone(&self.states)
    }

    pub fn kind_of(&self, name: &str) -> Option<RunStateKind> {
        self.states.lock().unwrap().get(name).map(|s| s.kind())
    }

    pub fn is_terminal(&self, name: &str) -> bool {
        self.states
            .lock()
            .unwrap()
            .get(name)
            .map(|s| s.is_terminal())
            .unwrap_or(true)
    }

    pub fn all_terminal(&self) -> bool {
        self.terminal == self.total
    }

    /// Decrement the unresolved predecessor count and return the remainder.
    pub fn decrement_unresolved(&mut self, name: &str) -> usize {
        match self.unresolved.get_mut(name) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        }
    }

    /// True if every declared predecessor of `name` completed successfully.
    pub fn deps_completed(&self, graph: &TaskGraph, name: &str) -> bool {
        let states = self.states.lock().unwrap();
        graph
            .dependencies_of(name)
            .iter()
            .all(|dep| matches!(states.get(dep), Some(RunState::Completed(_))))
    }

    /// Cloned output of a completed task, for input threading.
    pub fn completed_value(&self, name: &str) -> Option<TaskValue> {
        match self.states.lock().unwrap().get(name) {
            Some(RunState::Completed(value)) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn mark_ready(&mut self, name: &str) -> bool {
        self.transition(name, RunState::Ready, |s| matches!(s, RunState::Pending))
    }

    pub fn mark_running(&mut self, name: &str) -> bool {
        self.transition(name, RunState::Running, |s| matches!(s, RunState::Ready))
    }

    pub fn complete(&mut self, name: &str, value: TaskValue) -> bool {
        self.transition(name, RunState::Completed(value), |s| {
            matches!(s, RunState::Running)
        })
    }

    pub fn fail(&mut self, name: &str, error: TaskError) -> bool {
        self.transition(name, RunState::Failed(error), |s| {
            matches!(s, RunState::Running)
        })
    }

    pub fn cancel(&mut self, name: &str) -> bool {
        self.transition(name, RunState::Cancelled, |s| matches!(s, RunState::Running))
    }

    pub fn discard(&mut self, name: &str) -> bool {
        self.transition(name, RunState::Discarded, |s| {
            matches!(s, RunState::Pending | RunState::Ready)
        })
    }

    /// Discard `seed` if it has not started, then walk its dependents,
    /// discarding every one that has not started either. Returns the newly
    /// discarded names.
    ///
    /// A dependent that is already terminal (or running, which can only
    /// happen when `seed` completed) stops the walk at that branch.
    pub fn discard_transitively(&mut self, graph: &TaskGraph, seed: &str) -> Vec<TaskName> {
        let mut discarded = Vec::new();
        if self.discard(seed) {
            discarded.push(seed.to_string());
        }

        let mut stack: Vec<TaskName> = graph.dependents_of(seed).to_vec();
        while let Some(name) = stack.pop() {
            if self.discard(&name) {
                debug!(task = %name, "discarded due to upstream outcome");
                stack.extend(graph.dependents_of(&name).iter().cloned());
                discarded.push(name);
            }
        }

        discarded
    }

    /// Discard every task that has not been launched yet.
    pub fn discard_all_unstarted(&mut self) -> Vec<TaskName> {
        let names: Vec<TaskName> = {
            let states = self.states.lock().unwrap();
            states
                .iter()
                .filter(|(_, s)| matches!(s, RunState::Pending | RunState::Ready))
                .map(|(name, _)| name.clone())
                .collect()
        };

        for name in &names {
            self.discard(name);
        }
        names
    }

    /// Clone the full state map; used to freeze the result at completion.
    pub fn snapshot(&self) -> HashMap<TaskName, RunState> {
        self.states.lock().unwrap().clone()
    }

    /// Apply a guarded transition. Returns false (and leaves the state
    /// untouched) when the current state does not allow it, which is how
    /// late events after a teardown are ignored.
    fn transition(
        &mut self,
        name: &str,
        next: RunState,
        allowed: impl Fn(&RunState) -> bool,
    ) -> bool {
        let became_terminal = next.is_terminal();
        let applied = {
            let mut states = self.states.lock().unwrap();
            match states.get_mut(name) {
                Some(slot) if allowed(slot) => {
                    *slot = next;
                    true
                }
                _ => false,
            }
        };

        if applied && became_terminal {
            self.terminal += 1;
        }
        applied
    }
}
