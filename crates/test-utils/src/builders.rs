#![allow(dead_code)]

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use jobchain::config::{ConfigFile, RawConfigFile, ToolConfig};
use jobchain::store::{Job, JobStore};
use jobchain::types::{JobId, JobStatus, JobType, QueueRef};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn jobs_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.config.jobs_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.config.workers = n;
        self
    }

    pub fn job_timeout(mut self, timeout: &str) -> Self {
        self.config.config.job_timeout = timeout.to_string();
        self
    }

    pub fn persistent_jobs(mut self, ids: &[&str]) -> Self {
        self.config.config.persistent_jobs = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn maintenance_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.config.maintenance_log_dir = Some(dir.into());
        self
    }

    pub fn max_gne_samples(mut self, n: u64) -> Self {
        self.config.thresholds.maximum_gne_samples = n;
        self
    }

    pub fn max_clusters_to_plot(mut self, n: u64) -> Self {
        self.config.thresholds.max_clusters_to_plot = n;
        self
    }

    pub fn tool(mut self, job_type: &str, cmd: &str) -> Self {
        self.config.tool.insert(
            job_type.to_string(),
            ToolConfig {
                cmd: cmd.to_string(),
            },
        );
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for stored `Job` rows.
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new(id: &str, job_type: JobType) -> Self {
        Self {
            job: Job {
                id: JobId::new(id),
                job_type,
                status: JobStatus::Finished,
                queue_ref: None,
                title: None,
                email: None,
                main_search_job: None,
                child_jobs: Vec::new(),
                depending_on: None,
                post_time: Utc::now(),
                start_time: None,
                finish_time: None,
            },
        }
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.job.status = status;
        self
    }

    pub fn root(mut self, root: &str) -> Self {
        self.job.main_search_job = Some(JobId::new(root));
        self
    }

    pub fn depending_on(mut self, dep: &str) -> Self {
        self.job.depending_on = Some(JobId::new(dep));
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.job.title = Some(title.to_string());
        self
    }

    pub fn email(mut self, email: &str) -> Self {
        self.job.email = Some(email.to_string());
        self
    }

    pub fn queue_ref(mut self, queue_ref: QueueRef) -> Self {
        self.job.queue_ref = Some(queue_ref);
        self
    }

    pub fn posted(mut self, at: DateTime<Utc>) -> Self {
        self.job.post_time = at;
        self
    }

    pub fn build(self) -> Job {
        self.job
    }

    /// Insert the row; the store links it to its root.
    pub fn insert(self, store: &dyn JobStore) -> Job {
        let job = self.job;
        store.insert(&job).expect("insert job row");
        job
    }
}
