// src/lineage/request.rs

//! Pending job requests and the TOML batch file format.
//!
//! ```toml
//! [[job]]
//! type = "search"
//! input = "query.fasta"
//! title = "my search"
//!
//! [[job]]
//! type = "gne"
//! after = 0
//! [job.options]
//! sample_number = 25
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::{JobchainError, Result};
use crate::types::{JobId, JobOptions, JobType, OptionValue};

/// One requested job within a submission batch. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingJobRequest {
    pub job_type: JobType,
    pub options: JobOptions,
    pub input: Option<PathBuf>,
    /// Previously stored job whose output this job consumes.
    pub basis: Option<JobId>,
    /// Index of an earlier request in the same batch that must finish first.
    pub after: Option<usize>,
    pub title: Option<String>,
    pub email: Option<String>,
}

impl PendingJobRequest {
    pub fn new(job_type: JobType) -> Self {
        Self {
            job_type,
            options: JobOptions::new(),
            input: None,
            basis: None,
            after: None,
            title: None,
            email: None,
        }
    }

    pub fn with_basis(mut self, basis: impl Into<JobId>) -> Self {
        self.basis = Some(basis.into());
        self
    }

    pub fn after(mut self, index: usize) -> Self {
        self.after = Some(index);
        self
    }

    pub fn with_option(mut self, key: &str, value: impl Into<OptionValue>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }

    pub fn with_input(mut self, input: impl Into<PathBuf>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BatchFile {
    #[serde(default)]
    job: Vec<BatchEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BatchEntry {
    #[serde(rename = "type")]
    job_type: JobType,
    #[serde(default)]
    basis: Option<JobId>,
    #[serde(default)]
    after: Option<usize>,
    #[serde(default)]
    input: Option<PathBuf>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    options: JobOptions,
}

impl From<BatchEntry> for PendingJobRequest {
    fn from(entry: BatchEntry) -> Self {
        Self {
            job_type: entry.job_type,
            options: entry.options,
            input: entry.input,
            basis: entry.basis,
            after: entry.after,
            title: entry.title.filter(|t| !t.trim().is_empty()),
            email: entry.email.filter(|e| !e.trim().is_empty()),
        }
    }
}

/// Parse a batch from TOML text.
pub fn parse_batch(contents: &str) -> Result<Vec<PendingJobRequest>> {
    let batch: BatchFile = toml::from_str(contents)?;
    if batch.job.is_empty() {
        return Err(JobchainError::EmptyBatch);
    }
    Ok(batch.job.into_iter().map(PendingJobRequest::from).collect())
}

pub fn load_batch(path: impl AsRef<Path>) -> Result<Vec<PendingJobRequest>> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    parse_batch(&contents)
}
