// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::types::{JobId, JobStatus};

#[derive(Error, Debug)]
pub enum JobchainError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// A submission named a prior job that does not exist.
    #[error("Reference error: unknown job '{0}'")]
    Reference(JobId),

    #[error("Invalid status transition for job {job}: {from} -> {to}")]
    InvalidTransition {
        job: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Execution of job {job} failed: {reason}")]
    ExecutionFailure { job: JobId, reason: String },

    #[error("Job store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Work queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("Job id already taken: {0}")]
    IdConflict(JobId),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Submission contained no jobs")]
    EmptyBatch,

    #[error("Invalid submission: {0}")]
    InvalidBatch(String),

    /// A batch failed after some of its jobs had already started; those
    /// jobs were kept.
    #[error("Submission failed ({cause}); jobs already started were kept: {}", join_ids(.kept))]
    PartiallySubmitted {
        kept: Vec<JobId>,
        cause: Box<JobchainError>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JobchainError {
    /// Transient infrastructure failures the submitting caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            JobchainError::StoreUnavailable(_) | JobchainError::QueueUnavailable(_)
        )
    }
}

fn join_ids(ids: &[JobId]) -> String {
    ids.iter().map(JobId::as_str).collect::<Vec<_>>().join(", ")
}

impl From<rusqlite::Error> for JobchainError {
    fn from(err: rusqlite::Error) -> Self {
        JobchainError::StoreUnavailable(err.to_string())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, JobchainError>;
