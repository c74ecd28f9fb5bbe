// src/app.rs

//! Wiring of the store, queue, filesystem and engine components.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ConfigFile;
use crate::engine::{
    JobLifecycle, LogNotifier, Notifier, OutboxNotifier, RecoveryReport, SubmissionOrchestrator,
    recover,
};
use crate::errors::Result;
use crate::exec::{ToolInvoker, WorkerPool};
use crate::fs::{FileSystem, RealFileSystem};
use crate::progress::ProgressTracker;
use crate::queue::{LocalWorkQueue, WorkQueue};
use crate::refdb::ReferenceDatabases;
use crate::retention::RetentionSweeper;
use crate::store::{JobStore, MemoryJobStore, SqliteJobStore};

/// Shared handles to every component, built from one configuration.
#[derive(Debug, Clone)]
pub struct Services {
    pub config: ConfigFile,
    pub fs: Arc<dyn FileSystem>,
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<LocalWorkQueue>,
    pub lifecycle: JobLifecycle,
    pub orchestrator: SubmissionOrchestrator,
    pub tracker: ProgressTracker,
    pub sweeper: RetentionSweeper,
}

impl Services {
    /// Wire the components. Queue references continue after the highest one
    /// already stored.
    pub fn new(
        config: ConfigFile,
        store: Arc<dyn JobStore>,
        fs: Arc<dyn FileSystem>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let jobs_dir = config.config.jobs_dir.clone();
        let queue = Arc::new(match store.last_queue_ref()? {
            Some(last) => LocalWorkQueue::starting_after(last),
            None => LocalWorkQueue::new(),
        });
        let dyn_queue: Arc<dyn WorkQueue> = queue.clone();

        let lifecycle = JobLifecycle::new(
            Arc::clone(&store),
            Arc::clone(&fs),
            notifier,
            &jobs_dir,
            config.notify.clone(),
        );
        let orchestrator =
            SubmissionOrchestrator::new(Arc::clone(&store), dyn_queue, Arc::clone(&fs), &jobs_dir);
        let tracker = ProgressTracker::new(
            Arc::clone(&store),
            Arc::clone(&fs),
            &jobs_dir,
            config.config.progress_mode,
        );
        let sweeper = RetentionSweeper::new(
            Arc::clone(&store),
            Arc::clone(&fs),
            &jobs_dir,
            config.config.persistent_jobs.clone(),
            config.config.maintenance_log_dir.clone(),
        );

        Ok(Self {
            config,
            fs,
            store,
            queue,
            lifecycle,
            orchestrator,
            tracker,
            sweeper,
        })
    }

    /// Real filesystem, SQLite store when configured, and the configured
    /// notification sink. Unfinished rows are put back on the queue.
    pub fn from_config(config: ConfigFile) -> Result<Self> {
        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

        let store: Arc<dyn JobStore> = match &config.config.database {
            Some(path) => Arc::new(SqliteJobStore::open(path)?),
            None => {
                warn!("no [config].database set; jobs are kept in memory only");
                Arc::new(MemoryJobStore::new())
            }
        };

        let notifier: Arc<dyn Notifier> = match &config.notify.outbox {
            Some(dir) => Arc::new(OutboxNotifier::new(dir, Arc::clone(&fs))),
            None => Arc::new(LogNotifier),
        };

        info!(jobs_dir = %config.config.jobs_dir.display(), "services initialised");
        let services = Self::new(config, store, fs, notifier)?;
        services.recover()?;
        Ok(services)
    }

    /// Re-enqueue the rows an earlier process left unfinished.
    pub fn recover(&self) -> Result<RecoveryReport> {
        recover(
            self.store.as_ref(),
            self.queue.as_ref(),
            &self.lifecycle,
            self.fs.as_ref(),
        )
    }

    pub fn worker_pool(&self, invoker: Arc<dyn ToolInvoker>) -> WorkerPool {
        WorkerPool::new(
            Arc::clone(&self.queue),
            self.lifecycle.clone(),
            invoker,
            Arc::clone(&self.fs),
            self.config.thresholds,
            self.config.config.job_timeout,
            self.config.config.workers,
        )
    }

    /// `None` when no `[config].reference_db_dir` is set.
    pub fn reference_databases(&self) -> Option<ReferenceDatabases> {
        self.config
            .config
            .reference_db_dir
            .as_ref()
            .map(|dir| ReferenceDatabases::new(dir, Arc::clone(&self.fs)))
    }
}
