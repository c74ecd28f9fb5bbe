// src/store/memory.rs

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{EMAIL_SCRUBBED, Job, JobStore};
use crate::errors::{JobchainError, Result};
use crate::types::{JobId, JobStatus, QueueRef, Statistic};

#[derive(Debug, Default)]
struct MemoryState {
    jobs: BTreeMap<JobId, Job>,
    issued: HashSet<JobId>,
    stats: HashMap<Statistic, u64>,
}

/// In-process job store guarded by a single mutex.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    state: Mutex<MemoryState>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| JobchainError::StoreUnavailable("memory store lock poisoned".into()))
    }
}

impl JobStore for MemoryJobStore {
    fn get(&self, id: &JobId) -> Result<Option<Job>> {
        Ok(self.state()?.jobs.get(id).cloned())
    }

    fn insert(&self, job: &Job) -> Result<()> {
        let mut state = self.state()?;
        if !state.issued.insert(job.id.clone()) {
            return Err(JobchainError::IdConflict(job.id.clone()));
        }
        if let Some(root) = job
            .main_search_job
            .as_ref()
            .and_then(|root| state.jobs.get_mut(root))
        {
            if !root.child_jobs.contains(&job.id) {
                root.child_jobs.push(job.id.clone());
            }
        }
        state.jobs.insert(job.id.clone(), job.clone());
        debug!(job = %job.id, "inserted job row");
        Ok(())
    }

    fn delete(&self, id: &JobId) -> Result<bool> {
        let mut state = self.state()?;
        let Some(job) = state.jobs.remove(id) else {
            return Ok(false);
        };
        if let Some(root) = job
            .main_search_job
            .as_ref()
            .and_then(|root| state.jobs.get_mut(root))
        {
            root.child_jobs.retain(|child| child != id);
        }
        Ok(true)
    }

    fn set_queue_ref(&self, id: &JobId, queue_ref: QueueRef) -> Result<()> {
        let mut state = self.state()?;
        let job = state
            .jobs
            .get_mut(id)
            .ok_or_else(|| JobchainError::JobNotFound(id.clone()))?;
        job.queue_ref = Some(queue_ref);
        Ok(())
    }

    fn transition(
        &self,
        id: &JobId,
        from: JobStatus,
        to: JobStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut guard = self.state()?;
        let state = &mut *guard;
        let job = state
            .jobs
            .get_mut(id)
            .ok_or_else(|| JobchainError::JobNotFound(id.clone()))?;

        if job.status != from {
            return Err(JobchainError::InvalidTransition {
                job: id.clone(),
                from: job.status,
                to,
            });
        }

        job.status = to;
        if to == JobStatus::Running && job.start_time.is_none() {
            job.start_time = Some(at);
        }
        if to.is_terminal() && job.finish_time.is_none() {
            job.finish_time = Some(at);
        }
        if let Some(stat) = Statistic::for_status(to) {
            *state.stats.entry(stat).or_insert(0) += 1;
        }
        Ok(())
    }

    fn scrub_email(&self, id: &JobId) -> Result<()> {
        let mut state = self.state()?;
        if let Some(job) = state.jobs.get_mut(id) {
            if job.email.as_deref().is_some_and(|e| !e.is_empty()) {
                job.email = Some(EMAIL_SCRUBBED.to_string());
            }
        }
        Ok(())
    }

    fn statistic(&self, stat: Statistic) -> Result<u64> {
        Ok(self.state()?.stats.get(&stat).copied().unwrap_or(0))
    }

    fn job_ids(&self) -> Result<Vec<JobId>> {
        Ok(self.state()?.jobs.keys().cloned().collect())
    }

    fn id_issued(&self, id: &JobId) -> Result<bool> {
        Ok(self.state()?.issued.contains(id))
    }

    fn unfinished_jobs(&self) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .state()?
            .jobs
            .values()
            .filter(|job| !job.status.is_terminal())
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.post_time.cmp(&b.post_time).then_with(|| a.id.cmp(&b.id)));
        Ok(jobs)
    }

    fn last_queue_ref(&self) -> Result<Option<QueueRef>> {
        Ok(self.state()?.jobs.values().filter_map(|job| job.queue_ref).max())
    }
}
