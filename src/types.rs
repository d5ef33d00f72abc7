// src/types.rs

use std::str::FromStr;

use serde::Deserialize;

/// Public type alias for task names throughout the crate.
pub type TaskName = String;

/// The value produced by a completed task and threaded into its dependents.
pub type TaskValue = serde_json::Value;

/// Which failure family governs a run.
///
/// - `Propagate`: the first unhandled failure aborts the run and is re-raised
///   to the caller.
/// - `Continue`: failures are recorded, their dependents discarded, and the
///   invocation returns a result normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureAction {
    Propagate,
    Continue,
}

impl Default for FailureAction {
    fn default() -> Self {
        FailureAction::Propagate
    }
}

impl FromStr for FailureAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "propagate" | "propagate_error" => Ok(FailureAction::Propagate),
            "continue" | "continue_result" => Ok(FailureAction::Continue),
            other => Err(format!(
                "invalid policy: {other} (expected \"propagate\" or \"continue\")"
            )),
        }
    }
}

/// How far teardown reaches when a failure stops part of the graph.
///
/// The failed task's direct and transitive successors are always discarded;
/// the mode decides what happens to everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationMode {
    /// Discard every task that has not been launched yet; running tasks
    /// finish on their own.
    DiscardNotStarted,
    /// Discard only the failed task's successors; the rest of the graph runs
    /// to completion.
    DiscardChildren,
    /// Discard everything unstarted and request cancellation of every
    /// currently running task.
    CancelAll,
}

impl Default for CancellationMode {
    fn default() -> Self {
        CancellationMode::DiscardNotStarted
    }
}

impl FromStr for CancellationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "discard_not_started" => Ok(CancellationMode::DiscardNotStarted),
            "discard_children" => Ok(CancellationMode::DiscardChildren),
            "cancel_all" => Ok(CancellationMode::CancelAll),
            other => Err(format!(
                "invalid cancellation_mode: {other} (expected \"discard_not_started\", \
                 \"discard_children\" or \"cancel_all\")"
            )),
        }
    }
}
