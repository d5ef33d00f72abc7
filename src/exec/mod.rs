// src/exec/mod.rs

//! Execution of individual units of work on the Tokio runtime.

pub mod task_runner;

pub(crate) use task_runner::{spawn_task, LaunchedTask};
