// src/progress/mod.rs

//! Progress Tracker: stages completed, inferred from the job log.

pub mod stages;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::config::ProgressMode;
use crate::errors::Result;
use crate::fs::{FileSystem, is_not_found};
use crate::layout::JobPaths;
use crate::store::JobStore;
use crate::types::{JobId, JobType};

pub use stages::{StageMarker, recorded_flags, stages_for};

/// `completed` is `-1` while the job has not produced a log yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: i32,
    pub total: i32,
}

impl Progress {
    pub const NOT_STARTED: i32 = -1;

    pub fn is_started(&self) -> bool {
        self.completed != Self::NOT_STARTED
    }
}

/// Count the stages whose marker appears in `log`.
pub fn count_completed(stages: &[StageMarker], log: &str, mode: ProgressMode) -> usize {
    match mode {
        ProgressMode::Lenient => stages.iter().filter(|s| log.contains(s.marker)).count(),
        ProgressMode::Sequential => {
            let mut cursor = 0;
            let mut done = 0;
            for stage in stages {
                match log[cursor..].find(stage.marker) {
                    Some(pos) => {
                        cursor += pos + stage.marker.len();
                        done += 1;
                    }
                    None => break,
                }
            }
            done
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressTracker {
    store: Arc<dyn JobStore>,
    fs: Arc<dyn FileSystem>,
    jobs_dir: PathBuf,
    mode: ProgressMode,
}

impl ProgressTracker {
    pub fn new(
        store: Arc<dyn JobStore>,
        fs: Arc<dyn FileSystem>,
        jobs_dir: impl Into<PathBuf>,
        mode: ProgressMode,
    ) -> Self {
        Self {
            store,
            fs,
            jobs_dir: jobs_dir.into(),
            mode,
        }
    }

    /// Flags recorded in the job's command file; empty if it does not exist.
    pub fn flags(&self, paths: &JobPaths) -> BTreeSet<String> {
        match self.fs.read_to_string(&paths.command_file) {
            Ok(command) => recorded_flags(&command),
            Err(e) => {
                if !is_not_found(&e) {
                    debug!(error = %e, "could not read command file");
                }
                BTreeSet::new()
            }
        }
    }

    pub fn stages(&self, id: &JobId, job_type: JobType) -> Vec<StageMarker> {
        let paths = JobPaths::new(&self.jobs_dir, id);
        stages_for(job_type, &self.flags(&paths))
    }

    pub fn progress(&self, id: &JobId) -> Result<Progress> {
        let job = self.store.fetch(id)?;
        let paths = JobPaths::new(&self.jobs_dir, id);
        let stages = stages_for(job.job_type, &self.flags(&paths));
        let total = stages.len() as i32;

        let log = match self.fs.read_to_string(&paths.log_file) {
            Ok(log) => log,
            Err(e) if is_not_found(&e) => {
                return Ok(Progress {
                    completed: Progress::NOT_STARTED,
                    total,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let completed = count_completed(&stages, &log, self.mode) as i32;
        Ok(Progress { completed, total })
    }
}
