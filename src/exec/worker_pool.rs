// src/exec/worker_pool.rs

//! Worker pool draining a [`LocalWorkQueue`].
//!
//! Each worker loops over queue dispatches:
//!
//! - `Run`: pre-execution hook, threshold guard, tool invocation bounded by
//!   the job timeout, result manifest, post-execution hook, queue completion.
//! - `Release`: `waiting -> queued` on the row, then the entry becomes
//!   runnable.
//! - `Cancel`: the predecessor failed; the waiting job is failed.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ThresholdSection;
use crate::engine::{ExecutionOutcome, JobLifecycle};
use crate::errors::Result;
use crate::exec::archive::write_manifest;
use crate::exec::backend::{Invocation, ToolInvoker};
use crate::exec::thresholds::{self, THRESHOLD_EXIT_CODE, count_input_files};
use crate::fs::FileSystem;
use crate::layout::JobPaths;
use crate::queue::{Dispatch, LocalWorkQueue, QueueEntry, QueuePayload, WorkQueue};
use crate::types::{JobStatus, JobType};

#[derive(Debug)]
struct Worker {
    queue: Arc<LocalWorkQueue>,
    lifecycle: JobLifecycle,
    invoker: Arc<dyn ToolInvoker>,
    fs: Arc<dyn FileSystem>,
    thresholds: ThresholdSection,
    job_timeout: Duration,
}

#[derive(Debug)]
pub struct WorkerPool {
    worker: Arc<Worker>,
    size: usize,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<LocalWorkQueue>,
        lifecycle: JobLifecycle,
        invoker: Arc<dyn ToolInvoker>,
        fs: Arc<dyn FileSystem>,
        thresholds: ThresholdSection,
        job_timeout: Duration,
        size: usize,
    ) -> Self {
        Self {
            worker: Arc::new(Worker {
                queue,
                lifecycle,
                invoker,
                fs,
                thresholds,
                job_timeout,
            }),
            size: size.max(1),
        }
    }

    /// Start the workers. They exit once the queue is closed and drained.
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        (0..self.size)
            .map(|index| {
                let worker = Arc::clone(&self.worker);
                tokio::spawn(async move {
                    if let Err(e) = worker.run(index).await {
                        error!(worker = index, error = %e, "worker stopped");
                    }
                })
            })
            .collect()
    }

    /// Run until every queued job has been processed, then stop the workers.
    pub async fn run_until_idle(&self) -> Result<()> {
        let handles = self.spawn();
        self.worker.queue.wait_idle().await?;
        self.worker.queue.close();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task panicked");
            }
        }
        info!("work queue drained");
        Ok(())
    }
}

impl Worker {
    async fn run(&self, index: usize) -> Result<()> {
        debug!(worker = index, "worker started");
        while let Some(dispatch) = self.queue.next().await? {
            match dispatch {
                Dispatch::Run(entry) => {
                    let success = self.run_job(&entry).await;
                    let step = self.queue.complete(entry.queue_ref, success)?;
                    debug!(worker = index, job = %entry.payload.job, ?step, "entry completed");
                }
                Dispatch::Release(entry) => self.release(&entry)?,
                Dispatch::Cancel { entry, upstream } => {
                    if let Err(e) = self.lifecycle.cancel_dependent(&entry.payload.job, &upstream) {
                        error!(job = %entry.payload.job, error = %e, "could not fail dependent job");
                    }
                }
            }
        }
        debug!(worker = index, "worker finished");
        Ok(())
    }

    fn release(&self, entry: &QueueEntry) -> Result<()> {
        let job = &entry.payload.job;
        match self.lifecycle.release(job) {
            Ok(()) => {
                self.queue.release(entry.queue_ref)?;
            }
            Err(e) => {
                error!(job = %job, error = %e, "could not release waiting job; withdrawing it");
                self.queue.cancel(entry.queue_ref)?;
                if let Err(e) = self.lifecycle.force_failed(job, &e.to_string()) {
                    warn!(job = %job, error = %e, "could not fail withdrawn job");
                }
            }
        }
        Ok(())
    }

    /// Returns whether the job finished successfully.
    async fn run_job(&self, entry: &QueueEntry) -> bool {
        let payload = &entry.payload;
        let job = &payload.job;

        if let Err(e) = self.lifecycle.pre_execution(job) {
            error!(job = %job, error = %e, "pre-execution hook failed; skipping tool");
            return false;
        }

        let paths = self.lifecycle.paths(job);
        let input_files = self.input_files(payload, &paths);
        let outcome = match thresholds::check(
            payload.job_type,
            &payload.options,
            input_files,
            &self.thresholds,
        ) {
            Some(violation) => {
                warn!(job = %job, %violation, "threshold exceeded; tool not invoked");
                if let Err(e) = paths.append_log(self.fs.as_ref(), &violation.to_string()) {
                    warn!(job = %job, error = %e, "could not write threshold message");
                }
                ExecutionOutcome::Failed {
                    exit_code: THRESHOLD_EXIT_CODE,
                }
            }
            None => {
                let invocation = Invocation {
                    job: job.clone(),
                    job_type: payload.job_type,
                    paths: paths.clone(),
                    options: payload.options.clone(),
                    input: payload.input.clone(),
                    basis_results: payload.basis_results.clone(),
                };
                match tokio::time::timeout(self.job_timeout, self.invoker.invoke(invocation)).await
                {
                    Ok(Ok(0)) => ExecutionOutcome::Success,
                    Ok(Ok(exit_code)) => ExecutionOutcome::Failed { exit_code },
                    Ok(Err(e)) => ExecutionOutcome::Error(format!("{e:#}")),
                    Err(_) => ExecutionOutcome::Error(format!(
                        "job exceeded the execution timeout of {:?}",
                        self.job_timeout
                    )),
                }
            }
        };

        match write_manifest(self.fs.as_ref(), &paths) {
            Ok(files) => debug!(job = %job, files, "result manifest written"),
            Err(e) => warn!(job = %job, error = %e, "could not package results"),
        }

        match self.lifecycle.post_execution(job, &outcome) {
            Ok(status) => status == JobStatus::Finished,
            Err(e) => {
                error!(job = %job, error = %e, "post-execution hook failed");
                false
            }
        }
    }

    /// Files a `clinker` job would read: the basis results, or the uploads
    /// of a visualization started from uploaded files.
    fn input_files(&self, payload: &QueuePayload, paths: &JobPaths) -> Option<u64> {
        if payload.job_type != JobType::Clinker {
            return None;
        }
        let dir = payload.basis_results.as_deref().unwrap_or(&paths.uploads);
        match count_input_files(self.fs.as_ref(), dir) {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(job = %payload.job, dir = %dir.display(), error = %e, "cannot count input files");
                None
            }
        }
    }
}
