// src/queue/mod.rs

//! Work queue seam.
//!
//! The orchestrator only needs [`WorkQueue`]. [`LocalWorkQueue`] is the
//! in-process implementation driven by [`crate::exec::WorkerPool`].

use std::fmt::Debug;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::types::{JobId, JobOptions, JobType, QueueRef};

pub mod core;
pub mod local;

pub use self::core::{Dispatch, EntryState, QueueCore, QueueEntry, QueueStep};
pub use local::LocalWorkQueue;

/// What a worker needs to run one job.
///
/// Saved next to the job log at submission so that a later process can
/// rebuild the queue entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuePayload {
    pub job: JobId,
    pub job_type: JobType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<PathBuf>,
    /// Results directory of the job this one builds on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basis_results: Option<PathBuf>,
    #[serde(default)]
    pub options: JobOptions,
}

pub trait WorkQueue: Send + Sync + Debug {
    /// Add an entry. With `depends_on`, the entry is only dispatched after
    /// that entry succeeded.
    fn enqueue(&self, payload: QueuePayload, depends_on: Option<QueueRef>) -> Result<QueueRef>;

    /// Withdraw an entry that has not started yet.
    fn cancel(&self, queue_ref: QueueRef) -> Result<bool>;

    /// Number of entries waiting to run.
    fn len(&self) -> Result<usize>;

    /// Number of entries currently executing.
    fn running(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
