// src/engine/recover.rs

//! Startup recovery of rows left unfinished by an earlier process.
//!
//! The work queue lives in memory, so a restart loses every entry. Rows are
//! brought back in line with a fresh queue:
//!
//! - `running`: the tool was interrupted, the job is failed.
//! - `queued`: re-enqueued from the payload saved at submission.
//! - `waiting`: re-enqueued behind its predecessor's new entry, released if
//!   the predecessor already finished, failed if it failed or is gone.
//!
//! Every new queue reference is written back to its row.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::engine::JobLifecycle;
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::queue::WorkQueue;
use crate::store::{Job, JobStore};
use crate::types::{JobId, JobStatus, QueueRef};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Jobs that got a new queue entry.
    pub requeued: Vec<JobId>,
    /// Jobs that could not be resumed and were failed.
    pub failed: Vec<JobId>,
}

pub fn recover(
    store: &dyn JobStore,
    queue: &dyn WorkQueue,
    lifecycle: &JobLifecycle,
    fs: &dyn FileSystem,
) -> Result<RecoveryReport> {
    let mut recovery = Recovery {
        queue,
        lifecycle,
        fs,
        refs: HashMap::new(),
        report: RecoveryReport::default(),
    };

    let mut waiting = Vec::new();
    for job in store.unfinished_jobs()? {
        match job.status {
            JobStatus::Running => recovery.fail(&job.id, "interrupted while running")?,
            JobStatus::Queued => recovery.requeue(&job, None)?,
            _ => waiting.push(job),
        }
    }

    // Chains are resumed front to back; a waiting job whose predecessor is
    // itself waiting is retried on the next pass.
    while !waiting.is_empty() {
        let before = waiting.len();
        let mut deferred = Vec::new();

        for job in waiting {
            let Some(upstream) = job.depending_on.clone() else {
                lifecycle.release(&job.id)?;
                recovery.requeue(&job, None)?;
                continue;
            };

            if let Some(queue_ref) = recovery.refs.get(&upstream).copied() {
                recovery.requeue(&job, Some(queue_ref))?;
                continue;
            }

            match store.get(&upstream)?.map(|j| j.status) {
                Some(JobStatus::Finished) => {
                    lifecycle.release(&job.id)?;
                    recovery.requeue(&job, None)?;
                }
                Some(JobStatus::Waiting) => deferred.push(job),
                _ => {
                    lifecycle.cancel_dependent(&job.id, &upstream)?;
                    recovery.report.failed.push(job.id.clone());
                }
            }
        }

        if deferred.len() == before {
            for job in &deferred {
                recovery.fail(&job.id, "waiting on a job that can never finish")?;
            }
            break;
        }
        waiting = deferred;
    }

    info!(
        requeued = recovery.report.requeued.len(),
        failed = recovery.report.failed.len(),
        "recovered unfinished jobs"
    );
    Ok(recovery.report)
}

struct Recovery<'a> {
    queue: &'a dyn WorkQueue,
    lifecycle: &'a JobLifecycle,
    fs: &'a dyn FileSystem,
    refs: HashMap<JobId, QueueRef>,
    report: RecoveryReport,
}

impl Recovery<'_> {
    fn requeue(&mut self, job: &Job, depends_on: Option<QueueRef>) -> Result<()> {
        let paths = self.lifecycle.paths(&job.id);
        let payload = match paths.read_payload(self.fs) {
            Ok(payload) => payload,
            Err(e) => {
                return self.fail(&job.id, &format!("cannot restore queue entry: {e:#}"));
            }
        };

        let queue_ref = self.queue.enqueue(payload, depends_on)?;
        self.lifecycle.store().set_queue_ref(&job.id, queue_ref)?;
        info!(
            job = %job.id,
            old_ref = ?job.queue_ref.map(|r| r.0),
            queue_ref = %queue_ref,
            "job re-enqueued"
        );
        self.refs.insert(job.id.clone(), queue_ref);
        self.report.requeued.push(job.id.clone());
        Ok(())
    }

    fn fail(&mut self, id: &JobId, reason: &str) -> Result<()> {
        warn!(job = %id, reason, "unfinished job cannot be resumed");
        self.lifecycle.force_failed(id, reason)?;
        self.report.failed.push(id.clone());
        Ok(())
    }
}
