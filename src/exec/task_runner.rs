// src/exec/task_runner.rs

//! Spawns a single unit of work and reports its outcome to the runner.

use anyhow::anyhow;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::engine::runner::RunnerEvent;
use crate::errors::{TaskError, PANIC_TAG};
use crate::registry::{TaskContext, WorkFn};
use crate::types::TaskName;

/// Handle for a launched unit of work.
///
/// `cancel` asks the in-flight work to stop; the runner records `Cancelled`
/// only once the interruption has been observed and reported back.
pub(crate) struct LaunchedTask {
    cancel: Option<oneshot::Sender<()>>,
    #[allow(dead_code)]
    handle: tokio::task::JoinHandle<()>,
}

impl LaunchedTask {
    /// Request cooperative cancellation. Returns false if the work already
    /// finished or was asked to stop before.
    pub fn request_cancel(&mut self) -> bool {
        match self.cancel.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }
}

/// Launch one unit of work on the runtime.
pub(crate) fn spawn_task(
    name: TaskName,
    work: WorkFn,
    ctx: TaskContext,
    events_tx: mpsc::Sender<RunnerEvent>,
) -> LaunchedTask {
    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(run_task(name, work, ctx, events_tx, cancel_rx));

    LaunchedTask {
        cancel: Some(cancel_tx),
        handle,
    }
}

/// Drive one unit of work to a single event.
///
/// Either the work finishes on its own and the outcome is reported as
/// `TaskFinished` (panics are captured as failures, never unwound into the
/// orchestrator), or a cancellation request interrupts it at its next
/// suspension point and `TaskCancelled` is reported instead.
async fn run_task(
    name: TaskName,
    work: WorkFn,
    ctx: TaskContext,
    events_tx: mpsc::Sender<RunnerEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    // The work runs in its own task so that a panic surfaces at the join
    // instead of tearing down the runner.
    let mut inner = tokio::spawn((work)(ctx));

    tokio::select! {
        joined = &mut inner => {
            let outcome = match joined {
                Ok(result) => result,
                Err(join_err) if join_err.is_panic() => {
                    warn!(task = %name, "unit of work panicked");
                    let payload = join_err.into_panic();
                    let message = payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "task panicked".to_string());
                    Err(TaskError::new(PANIC_TAG, anyhow!("{message}")))
                }
                Err(join_err) => {
                    Err(TaskError::untagged(anyhow!("task '{name}' aborted: {join_err}")))
                }
            };
            let _ = events_tx
                .send(RunnerEvent::TaskFinished { task: name, outcome })
                .await;
        }

        cancel = &mut cancel_rx => {
            inner.abort();
            match cancel {
                Ok(()) => {
                    debug!(task = %name, "cancellation observed; aborting work");
                    let _ = events_tx
                        .send(RunnerEvent::TaskCancelled { task: name })
                        .await;
                }
                Err(_) => {
                    // Runner dropped without cancelling; nothing left to notify.
                    debug!(task = %name, "runner gone; dropping work");
                }
            }
        }
    }
}
