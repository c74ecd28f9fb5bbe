// src/exec/mod.rs

//! Tool execution layer.
//!
//! - [`backend`] provides the `ToolInvoker` trait and the shell-template
//!   implementation used in production; tests replace it with a fake.
//! - [`task_runner`] runs one tool process with its output going to the job
//!   log.
//! - [`worker_pool`] drains the local work queue and drives the lifecycle
//!   hooks around each invocation.
//! - [`thresholds`] rejects oversized requests before invocation.
//! - [`archive`] writes the result manifest.

pub mod archive;
pub mod backend;
pub mod task_runner;
pub mod thresholds;
pub mod worker_pool;

pub use backend::{Invocation, ShellToolInvoker, ToolInvoker};
pub use worker_pool::WorkerPool;
