// src/engine/lifecycle.rs

//! Status State Machine hooks.
//!
//! Every status change goes through [`JobLifecycle`], which checks the
//! transition against [`JobStatus::can_transition_to`] and applies it as a
//! compare-and-swap on the store. The store counts the terminal transition
//! in the same write; the lifecycle then sends the completion notification.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::NotifySection;
use crate::engine::notify::{Notifier, compose};
use crate::errors::{JobchainError, Result};
use crate::fs::FileSystem;
use crate::layout::JobPaths;
use crate::store::{Job, JobStore};
use crate::types::{JobId, JobStatus};

/// How a tool invocation ended, as seen by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Success,
    Failed { exit_code: i32 },
    /// The invocation could not be run or was aborted.
    Error(String),
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success)
    }
}

#[derive(Debug, Clone)]
pub struct JobLifecycle {
    store: Arc<dyn JobStore>,
    fs: Arc<dyn FileSystem>,
    notifier: Arc<dyn Notifier>,
    jobs_dir: PathBuf,
    notify_settings: NotifySection,
}

impl JobLifecycle {
    pub fn new(
        store: Arc<dyn JobStore>,
        fs: Arc<dyn FileSystem>,
        notifier: Arc<dyn Notifier>,
        jobs_dir: impl Into<PathBuf>,
        notify_settings: NotifySection,
    ) -> Self {
        Self {
            store,
            fs,
            notifier,
            jobs_dir: jobs_dir.into(),
            notify_settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn paths(&self, id: &JobId) -> JobPaths {
        JobPaths::new(&self.jobs_dir, id)
    }

    fn apply(&self, id: &JobId, from: JobStatus, to: JobStatus) -> Result<()> {
        if !from.can_transition_to(to) {
            return Err(JobchainError::InvalidTransition {
                job: id.clone(),
                from,
                to,
            });
        }
        self.store.transition(id, from, to, Utc::now())?;
        info!(job = %id, from = %from, to = %to, "job status changed");
        Ok(())
    }

    fn log_line(&self, id: &JobId, line: &str) {
        if let Err(e) = self.paths(id).append_log(self.fs.as_ref(), line) {
            warn!(job = %id, error = %e, "could not write to job log");
        }
    }

    /// `waiting -> queued`, once the predecessor finished.
    pub fn release(&self, id: &JobId) -> Result<()> {
        self.apply(id, JobStatus::Waiting, JobStatus::Queued)
    }

    /// Pre-execution hook: `queued -> running`, recording `start_time`.
    ///
    /// An out-of-order call forces the job to `failed` and returns the
    /// transition error; the tool must not be invoked.
    pub fn pre_execution(&self, id: &JobId) -> Result<()> {
        match self.apply(id, JobStatus::Queued, JobStatus::Running) {
            Ok(()) => Ok(()),
            Err(err @ JobchainError::InvalidTransition { .. }) => {
                error!(job = %id, error = %err, "pre-execution hook out of order");
                self.force_failed(id, &err.to_string())?;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Post-execution hook: `running -> finished|failed`.
    ///
    /// Never propagates the execution outcome as an error; returns the
    /// terminal status the job ended in.
    pub fn post_execution(&self, id: &JobId, outcome: &ExecutionOutcome) -> Result<JobStatus> {
        let to = match outcome {
            ExecutionOutcome::Success => JobStatus::Finished,
            ExecutionOutcome::Failed { exit_code } => {
                debug!(job = %id, exit_code, "tool reported failure");
                JobStatus::Failed
            }
            ExecutionOutcome::Error(reason) => {
                self.log_line(id, &format!("ERROR - {reason}"));
                JobStatus::Failed
            }
        };

        match self.apply(id, JobStatus::Running, to) {
            Ok(()) => {
                self.finish(id)?;
                Ok(to)
            }
            Err(err @ JobchainError::InvalidTransition { .. }) => {
                error!(job = %id, error = %err, "post-execution hook out of order");
                self.force_failed(id, &err.to_string())
            }
            Err(err) => Err(err),
        }
    }

    /// `waiting -> failed` for a job whose predecessor failed.
    pub fn cancel_dependent(&self, id: &JobId, upstream: &JobId) -> Result<()> {
        self.log_line(id, &format!("Preceding job {upstream} failed"));
        self.apply(id, JobStatus::Waiting, JobStatus::Failed)?;
        self.finish(id)
    }

    /// Move a job to `failed` from whatever non-terminal status it is in.
    /// Used for internal-consistency faults and timeouts.
    pub fn force_failed(&self, id: &JobId, reason: &str) -> Result<JobStatus> {
        self.log_line(id, &format!("ERROR - {reason}"));
        loop {
            let job = self.store.fetch(id)?;
            if job.status.is_terminal() {
                return Ok(job.status);
            }
            match self
                .store
                .transition(id, job.status, JobStatus::Failed, Utc::now())
            {
                Ok(()) => {
                    warn!(job = %id, from = %job.status, reason, "job forced to failed");
                    self.finish(id)?;
                    return Ok(JobStatus::Failed);
                }
                Err(JobchainError::InvalidTransition { .. }) => continue,
                Err(err) => return Err(err),
            }
        }
    }

    fn finish(&self, id: &JobId) -> Result<()> {
        let job = self.store.fetch(id)?;
        self.send_notification(&job)
    }

    fn send_notification(&self, job: &Job) -> Result<()> {
        let Some(address) = job.notification_address() else {
            return Ok(());
        };

        let message = compose(job, &self.notify_settings);
        match self.notifier.notify(address, &message.subject, &message.body) {
            Ok(()) => self.store.scrub_email(&job.id),
            Err(e) => {
                warn!(job = %job.id, error = %e, "sending notification failed");
                Ok(())
            }
        }
    }
}
