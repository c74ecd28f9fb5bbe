// src/engine/mod.rs

//! Orchestration engine.
//!
//! - [`submit`]: turns request batches into rows and queue entries.
//! - [`lifecycle`]: the status state machine and its pre/post-execution hooks.
//! - [`notify`]: completion notifications.
//! - [`recover`]: re-enqueues rows left unfinished by an earlier process.

pub mod lifecycle;
pub mod notify;
pub mod recover;
pub mod submit;

pub use lifecycle::{ExecutionOutcome, JobLifecycle};
pub use notify::{LogNotifier, Notification, Notifier, OutboxNotifier};
pub use recover::{RecoveryReport, recover};
pub use submit::{ServerInfo, ServerStatus, SubmissionOrchestrator};
