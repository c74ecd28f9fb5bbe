// src/lineage/related.rs

use std::fmt;

use crate::errors::Result;
use crate::store::{Job, JobStore};
use crate::types::{JobId, JobStatus, JobType};

/// How a connected job relates to the job being viewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Child,
    MainSearch,
    Depending,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Relation::Child => "child",
            Relation::MainSearch => "main search",
            Relation::Depending => "depending",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectedJob {
    pub id: JobId,
    pub title: Option<String>,
    pub job_type: JobType,
    pub status: JobStatus,
    pub relation: Relation,
}

impl ConnectedJob {
    fn from_job(job: &Job, relation: Relation) -> Self {
        Self {
            id: job.id.clone(),
            title: job.title.clone(),
            job_type: job.job_type,
            status: job.status,
            relation,
        }
    }
}

/// Jobs shown as related-jobs navigation for `id`.
///
/// A root lists its children; any other job lists its root and the job it
/// depends on. Rows that no longer exist are skipped.
pub fn connected_jobs(store: &dyn JobStore, id: &JobId) -> Result<Vec<ConnectedJob>> {
    let job = store.fetch(id)?;
    let mut connected = Vec::new();

    if job.is_root() {
        for child in &job.child_jobs {
            if let Some(child) = store.get(child)? {
                connected.push(ConnectedJob::from_job(&child, Relation::Child));
            }
        }
        return Ok(connected);
    }

    if let Some(root) = &job.main_search_job {
        if let Some(root) = store.get(root)? {
            connected.push(ConnectedJob::from_job(&root, Relation::MainSearch));
        }
    }
    if let Some(dep) = &job.depending_on {
        if let Some(dep) = store.get(dep)? {
            connected.push(ConnectedJob::from_job(&dep, Relation::Depending));
        }
    }
    Ok(connected)
}
