// src/engine/submit.rs

//! Submission Orchestrator.
//!
//! Per job, in batch order:
//!
//! 1. insert the row under a fresh id (status `queued` or `waiting`); the
//!    store links it to its root search in the same write,
//! 2. create the job directory, copy the input, record the options and save
//!    the queue payload,
//! 3. enqueue, depending on the predecessor's queue entry,
//! 4. store the queue reference on the row.
//!
//! The row always exists before its queue entry. If any step fails, the
//! current job is undone and the earlier jobs of the batch are withdrawn from
//! the queue and deleted, newest first. A job that a worker already picked up
//! cannot be withdrawn; it is kept and reported through
//! [`JobchainError::PartiallySubmitted`]. Every basis is resolved before the
//! first write, so an unknown reference leaves no trace.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::errors::{JobchainError, Result};
use crate::fs::FileSystem;
use crate::ids::insert_with_fresh_id;
use crate::layout::JobPaths;
use crate::lineage::{LinkSlot, PendingJobRequest, Predecessor, plan_links};
use crate::queue::{QueuePayload, WorkQueue};
use crate::store::{Job, JobStore};
use crate::types::{JobId, JobStatus, QueueRef, Statistic};

/// A job created by the current submission call.
#[derive(Debug, Clone)]
struct Created {
    id: JobId,
    queue_ref: QueueRef,
    paths: JobPaths,
}

#[derive(Debug, Clone)]
pub struct SubmissionOrchestrator {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn WorkQueue>,
    fs: Arc<dyn FileSystem>,
    jobs_dir: PathBuf,
}

impl SubmissionOrchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn WorkQueue>,
        fs: Arc<dyn FileSystem>,
        jobs_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            queue,
            fs,
            jobs_dir: jobs_dir.into(),
        }
    }

    /// Submit a batch and return the id of its last job.
    pub fn submit(&self, batch: &[PendingJobRequest]) -> Result<JobId> {
        let ids = self.submit_batch(batch)?;
        ids.last().cloned().ok_or(JobchainError::EmptyBatch)
    }

    /// Submit a batch and return the ids of all created jobs, in order.
    pub fn submit_batch(&self, batch: &[PendingJobRequest]) -> Result<Vec<JobId>> {
        if batch.is_empty() {
            return Err(JobchainError::EmptyBatch);
        }

        let slots = plan_links(self.store.as_ref(), batch)?;
        self.check_inputs(batch)?;

        let mut created: Vec<Created> = Vec::with_capacity(batch.len());
        for (request, slot) in batch.iter().zip(&slots) {
            match self.submit_one(request, slot, &created) {
                Ok(job) => created.push(job),
                Err(err) => {
                    error!(error = %err, done = created.len(), "submission failed; rolling back batch");
                    let kept = self.roll_back(&created);
                    if kept.is_empty() {
                        return Err(err);
                    }
                    return Err(JobchainError::PartiallySubmitted {
                        kept,
                        cause: Box::new(err),
                    });
                }
            }
        }

        let ids: Vec<JobId> = created.into_iter().map(|c| c.id).collect();
        info!(jobs = ?ids, "batch submitted");
        Ok(ids)
    }

    fn check_inputs(&self, batch: &[PendingJobRequest]) -> Result<()> {
        for request in batch {
            if let Some(input) = &request.input {
                if !self.fs.is_file(input) {
                    return Err(JobchainError::InvalidBatch(format!(
                        "input file {} does not exist",
                        input.display()
                    )));
                }
            }
        }
        Ok(())
    }

    fn submit_one(
        &self,
        request: &PendingJobRequest,
        slot: &LinkSlot,
        earlier: &[Created],
    ) -> Result<Created> {
        let earlier_ids: Vec<JobId> = earlier.iter().map(|c| c.id.clone()).collect();
        let lineage = slot.resolve(&earlier_ids)?;
        let depends_on = match &slot.predecessor {
            Some(Predecessor::Batch(p)) => Some(earlier[*p].queue_ref),
            Some(Predecessor::Stored { queue_ref, .. }) => Some(*queue_ref),
            None => None,
        };
        let basis_results = match (&slot.predecessor, &request.basis) {
            (Some(Predecessor::Batch(p)), _) => Some(earlier[*p].paths.results.clone()),
            (_, Some(basis)) => Some(JobPaths::new(&self.jobs_dir, basis).results),
            _ => None,
        };

        let now = Utc::now();
        let job = insert_with_fresh_id(self.store.as_ref(), |id| Job {
            id,
            job_type: request.job_type,
            status: JobStatus::initial(lineage.depending_on.is_some()),
            queue_ref: None,
            title: request.title.clone(),
            email: request.email.clone(),
            main_search_job: lineage.main_search_job.clone(),
            child_jobs: Vec::new(),
            depending_on: lineage.depending_on.clone(),
            post_time: now,
            start_time: None,
            finish_time: None,
        })?;

        let paths = JobPaths::new(&self.jobs_dir, &job.id);
        let payload = match self.prepare_directory(request, &job, &paths, basis_results) {
            Ok(payload) => payload,
            Err(err) => {
                self.discard(&job.id, &paths);
                return Err(err);
            }
        };

        let queue_ref = match self.queue.enqueue(payload, depends_on) {
            Ok(queue_ref) => queue_ref,
            Err(err) => {
                self.discard(&job.id, &paths);
                return Err(err);
            }
        };

        if let Err(err) = self.store.set_queue_ref(&job.id, queue_ref) {
            if let Err(e) = self.queue.cancel(queue_ref) {
                warn!(queue_ref = %queue_ref, error = %e, "could not withdraw queue entry");
            }
            self.discard(&job.id, &paths);
            return Err(err);
        }

        info!(
            job = %job.id,
            job_type = %job.job_type,
            status = %job.status,
            queue_ref = %queue_ref,
            depends_on = ?job.depending_on.as_ref().map(JobId::as_str),
            "job submitted"
        );

        Ok(Created {
            id: job.id,
            queue_ref,
            paths,
        })
    }

    fn prepare_directory(
        &self,
        request: &PendingJobRequest,
        job: &Job,
        paths: &JobPaths,
        basis_results: Option<PathBuf>,
    ) -> Result<QueuePayload> {
        paths.create(self.fs.as_ref())?;

        let input = match &request.input {
            Some(source) => {
                let name = source.file_name().ok_or_else(|| {
                    JobchainError::InvalidBatch(format!("input {} is not a file", source.display()))
                })?;
                let target = paths.uploads.join(name);
                let bytes = self.fs.read(source)?;
                self.fs.write(&target, &bytes)?;
                Some(target)
            }
            None => None,
        };

        paths.write_options(self.fs.as_ref(), &request.options)?;

        let payload = QueuePayload {
            job: job.id.clone(),
            job_type: job.job_type,
            input,
            basis_results,
            options: request.options.clone(),
        };
        paths.write_payload(self.fs.as_ref(), &payload)?;
        Ok(payload)
    }

    /// Remove a row (and its directory) that never got a queue entry.
    fn discard(&self, id: &JobId, paths: &JobPaths) {
        if let Err(e) = self.store.delete(id) {
            error!(job = %id, error = %e, "could not delete row during rollback");
        }
        if self.fs.is_dir(&paths.root) {
            if let Err(e) = self.fs.remove_dir_all(&paths.root) {
                warn!(job = %id, error = %e, "could not remove job directory during rollback");
            }
        }
    }

    /// Withdraw and delete `created`, newest first. Returns the jobs that
    /// could not be withdrawn, in batch order.
    fn roll_back(&self, created: &[Created]) -> Vec<JobId> {
        let mut kept = Vec::new();
        for job in created.iter().rev() {
            match self.queue.cancel(job.queue_ref) {
                Ok(true) => self.discard(&job.id, &job.paths),
                Ok(false) => {
                    warn!(job = %job.id, queue_ref = %job.queue_ref, "job already started; keeping it");
                    kept.push(job.id.clone());
                }
                Err(e) => {
                    error!(job = %job.id, error = %e, "could not withdraw queue entry during rollback");
                    kept.push(job.id.clone());
                }
            }
        }
        kept.reverse();
        kept
    }

    /// Snapshot for status pages.
    pub fn server_info(&self) -> Result<ServerInfo> {
        let running = self.queue.running()?;
        Ok(ServerInfo {
            status: if running == 0 {
                ServerStatus::Idle
            } else {
                ServerStatus::Running
            },
            queued: self.queue.len()?,
            running,
            completed: self.store.statistic(Statistic::Finished)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Idle,
    Running,
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ServerStatus::Idle => "idle",
            ServerStatus::Running => "running",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerInfo {
    pub status: ServerStatus,
    pub queued: usize,
    pub running: usize,
    pub completed: u64,
}
