// src/store/mod.rs

//! Job Record Store: durable rows for jobs plus aggregate counters.
//!
//! - [`memory`] is a mutex-guarded in-process store (tests, `--wait` runs
//!   without a database).
//! - [`sqlite`] persists rows in a SQLite file.
//!
//! Both enforce id uniqueness over every id ever inserted, so an id that was
//! swept away is never handed out again.

use std::fmt::Debug;

use chrono::{DateTime, Utc};

use crate::errors::{JobchainError, Result};
use crate::types::{JobId, JobStatus, JobType, QueueRef, Statistic};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryJobStore;
pub use sqlite::SqliteJobStore;

/// Value stored in `email` once the completion notification went out.
pub const EMAIL_SCRUBBED: &str = "-";

/// One persisted unit of orchestrated work.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub job_type: JobType,
    pub status: JobStatus,
    pub queue_ref: Option<QueueRef>,
    pub title: Option<String>,
    pub email: Option<String>,
    /// Root of this job's lineage tree; `None` when the job is itself a root.
    pub main_search_job: Option<JobId>,
    /// Jobs whose root is this job. Only populated on roots.
    pub child_jobs: Vec<JobId>,
    /// Job that has to finish before this one becomes runnable.
    pub depending_on: Option<JobId>,
    pub post_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub finish_time: Option<DateTime<Utc>>,
}

impl Job {
    pub fn is_root(&self) -> bool {
        self.main_search_job.is_none()
    }

    /// Id of the lineage root (the job itself for roots).
    pub fn root_id(&self) -> &JobId {
        self.main_search_job.as_ref().unwrap_or(&self.id)
    }

    /// Address to notify, if one was supplied and not yet scrubbed.
    pub fn notification_address(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty() && *e != EMAIL_SCRUBBED)
    }
}

/// Storage operations the orchestrator needs.
///
/// Every method is a single short-lived store call; implementations must make
/// each one atomic with respect to concurrent callers.
pub trait JobStore: Send + Sync + Debug {
    fn get(&self, id: &JobId) -> Result<Option<Job>>;

    /// Insert a new row. Fails with [`JobchainError::IdConflict`] when the id
    /// was ever used before, including by rows that were deleted since.
    ///
    /// A row with a `main_search_job` is appended to that root's
    /// `child_jobs` in the same write, if the root still exists.
    fn insert(&self, job: &Job) -> Result<()>;

    /// Remove a row and its entry in its root's `child_jobs`. Returns `false`
    /// if no such row existed.
    fn delete(&self, id: &JobId) -> Result<bool>;

    fn set_queue_ref(&self, id: &JobId, queue_ref: QueueRef) -> Result<()>;

    /// Compare-and-swap the status from `from` to `to`.
    ///
    /// Records `start_time` when entering `running` and `finish_time` when
    /// entering a terminal status, each only if still unset. Entering a
    /// terminal status also adds one to its [`Statistic`] in the same write.
    /// If the row's current status is not `from`, fails with
    /// [`JobchainError::InvalidTransition`] carrying the actual status and
    /// changes nothing.
    fn transition(
        &self,
        id: &JobId,
        from: JobStatus,
        to: JobStatus,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Replace the stored email with [`EMAIL_SCRUBBED`] if one is present.
    fn scrub_email(&self, id: &JobId) -> Result<()>;

    fn statistic(&self, stat: Statistic) -> Result<u64>;

    /// Ids of all live rows.
    fn job_ids(&self) -> Result<Vec<JobId>>;

    /// Whether the id was ever issued (live or deleted).
    fn id_issued(&self, id: &JobId) -> Result<bool>;

    /// Rows not yet `finished` or `failed`, oldest first.
    fn unfinished_jobs(&self) -> Result<Vec<Job>>;

    /// Highest queue reference stored on any live row.
    fn last_queue_ref(&self) -> Result<Option<QueueRef>>;

    /// Like [`JobStore::get`] but a missing row is an error.
    fn fetch(&self, id: &JobId) -> Result<Job> {
        self.get(id)?
            .ok_or_else(|| JobchainError::JobNotFound(id.clone()))
    }
}
