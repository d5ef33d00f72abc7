// src/engine/policy.rs

//! Failure policy: what happens to the rest of the graph when a task fails.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::TaskError;
use crate::types::{CancellationMode, FailureAction, TaskValue};

/// Function invoked by a [`Handler::Recover`] to substitute a value for a
/// failure.
pub type RecoverFn = Arc<dyn Fn(&TaskError) -> TaskValue + Send + Sync>;

/// Strategy for one matched error tag.
#[derive(Clone)]
pub enum Handler {
    /// Convert the failure into a completed outcome carrying the returned
    /// value; successors run normally with it.
    Recover(RecoverFn),
    /// Abort the run with the given cancellation scope and re-raise the
    /// failure to the caller.
    Propagate(CancellationMode),
    /// Record the failure, apply the given scope, and keep going.
    Continue(CancellationMode),
    /// Delegate to a nested map, resolved with the same error.
    Nested(HandlerMap),
}

impl Handler {
    /// Shorthand for a `Recover` handler from a closure.
    pub fn recover<F>(f: F) -> Self
    where
        F: Fn(&TaskError) -> TaskValue + Send + Sync + 'static,
    {
        Handler::Recover(Arc::new(f))
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Recover(_) => write!(f, "Recover(..)"),
            Handler::Propagate(mode) => write!(f, "Propagate({mode:?})"),
            Handler::Continue(mode) => write!(f, "Continue({mode:?})"),
            Handler::Nested(map) => write!(f, "Nested({map:?})"),
        }
    }
}

/// Mapping from error tags to handler strategies.
///
/// Resolution walks a failure's tags most-specific-first and takes the first
/// entry present; a [`Handler::Nested`] map is resolved recursively with the
/// same error. There is no implicit catch-all: an unmatched failure falls
/// through to the policy default.
#[derive(Clone, Debug, Default)]
pub struct HandlerMap {
    entries: HashMap<String, Handler>,
}

impl HandlerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn on(mut self, tag: impl Into<String>, handler: Handler) -> Self {
        self.entries.insert(tag.into(), handler);
        self
    }

    pub fn insert(&mut self, tag: impl Into<String>, handler: Handler) {
        self.entries.insert(tag.into(), handler);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve the most specific matching handler for the given tag list.
    pub(crate) fn resolve(&self, tags: &[String]) -> Option<ResolvedHandler> {
        for tag in tags {
            if let Some(handler) = self.entries.get(tag.as_str()) {
                return match handler {
                    Handler::Recover(f) => Some(ResolvedHandler::Recover(Arc::clone(f))),
                    Handler::Propagate(mode) => Some(ResolvedHandler::Propagate(*mode)),
                    Handler::Continue(mode) => Some(ResolvedHandler::Continue(*mode)),
                    Handler::Nested(inner) => inner.resolve(tags),
                };
            }
        }
        None
    }
}

/// A handler with nesting flattened out.
pub(crate) enum ResolvedHandler {
    Recover(RecoverFn),
    Propagate(CancellationMode),
    Continue(CancellationMode),
}

/// Per-invocation policy: failure family, cancellation scope, exception
/// handlers, and an optional whole-run deadline.
#[derive(Clone, Debug)]
pub struct RunPolicy {
    pub action: FailureAction,
    pub cancellation: CancellationMode,
    pub handlers: HandlerMap,
    pub timeout: Option<Duration>,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self::propagate()
    }
}

impl RunPolicy {
    /// Abort on the first unhandled failure and re-raise it; unstarted work
    /// is discarded while running tasks finish on their own.
    pub fn propagate() -> Self {
        Self {
            action: FailureAction::Propagate,
            cancellation: CancellationMode::DiscardNotStarted,
            handlers: HandlerMap::new(),
            timeout: None,
        }
    }

    /// Record failures, discard their dependents, and run everything else to
    /// completion; the invocation never fails the caller.
    pub fn continue_result() -> Self {
        Self {
            action: FailureAction::Continue,
            cancellation: CancellationMode::DiscardChildren,
            handlers: HandlerMap::new(),
            timeout: None,
        }
    }

    pub fn with_cancellation(mut self, mode: CancellationMode) -> Self {
        self.cancellation = mode;
        self
    }

    pub fn with_handlers(mut self, handlers: HandlerMap) -> Self {
        self.handlers = handlers;
        self
    }

    /// Register a handler for one error tag.
    pub fn on(mut self, tag: impl Into<String>, handler: Handler) -> Self {
        self.handlers.insert(tag, handler);
        self
    }

    /// Cancel the whole run if it has not drained by the deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Serde mirror of the configuration surface.
///
/// Handlers are code, not configuration, so they are absent here; attach
/// them with [`RunPolicy::with_handlers`] after conversion.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub policy: FailureAction,
    #[serde(default)]
    pub cancellation_mode: Option<CancellationMode>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl From<PolicyConfig> for RunPolicy {
    fn from(cfg: PolicyConfig) -> Self {
        let mut policy = match cfg.policy {
            FailureAction::Propagate => RunPolicy::propagate(),
            FailureAction::Continue => RunPolicy::continue_result(),
        };
        if let Some(mode) = cfg.cancellation_mode {
            policy.cancellation = mode;
        }
        if let Some(ms) = cfg.timeout_ms {
            policy.timeout = Some(Duration::from_millis(ms));
        }
        policy
    }
}
