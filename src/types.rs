// src/types.rs

//! Shared domain types: identifiers, job types, statuses and counters.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque job identifier, unique among every job ever created.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id follows the generated shape (see [`crate::ids`]).
    pub fn is_well_formed(&self) -> bool {
        crate::ids::is_well_formed(&self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Reference to an entry in the work queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueRef(pub u64);

impl fmt::Display for QueueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q-{}", self.0)
    }
}

impl FromStr for QueueRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .strip_prefix("q-")
            .and_then(|n| n.parse().ok())
            .map(QueueRef)
            .ok_or_else(|| format!("invalid queue reference: {s}"))
    }
}

/// Kind of analysis stage a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// A fresh search; always the root of a lineage tree.
    Search,
    /// Re-filter a previous search with new thresholds.
    Recompute,
    /// Gene neighbourhood estimation.
    Gne,
    ExtractSequences,
    ExtractClusters,
    /// Cluster comparison visualization.
    Clinker,
    /// Visualization of clusters together with the query.
    ClinkerQuery,
}

impl JobType {
    pub const ALL: [JobType; 7] = [
        JobType::Search,
        JobType::Recompute,
        JobType::Gne,
        JobType::ExtractSequences,
        JobType::ExtractClusters,
        JobType::Clinker,
        JobType::ClinkerQuery,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobType::Search => "search",
            JobType::Recompute => "recompute",
            JobType::Gne => "gne",
            JobType::ExtractSequences => "extract_sequences",
            JobType::ExtractClusters => "extract_clusters",
            JobType::Clinker => "clinker",
            JobType::ClinkerQuery => "clinker_query",
        }
    }

    /// Job types that always start a new lineage tree.
    pub fn is_root_type(self) -> bool {
        matches!(self, JobType::Search)
    }

    /// Job types that consume the output of an earlier job and therefore
    /// need a basis job or an in-batch predecessor.
    pub fn requires_basis(self) -> bool {
        matches!(
            self,
            JobType::Recompute
                | JobType::Gne
                | JobType::ExtractSequences
                | JobType::ExtractClusters
                | JobType::ClinkerQuery
        )
    }

    /// Name of the external tool that produces this job's log.
    pub fn tool(self) -> &'static str {
        match self {
            JobType::Clinker => "clinker",
            _ => "cblaster",
        }
    }

    /// Job types a user may submit on top of a finished job of this type.
    pub fn downstream(self) -> &'static [JobType] {
        match self {
            JobType::Search => &[
                JobType::Recompute,
                JobType::Gne,
                JobType::ExtractSequences,
                JobType::ExtractClusters,
                JobType::Clinker,
                JobType::ClinkerQuery,
            ],
            JobType::Recompute => &[
                JobType::Gne,
                JobType::ExtractSequences,
                JobType::ExtractClusters,
                JobType::Clinker,
                JobType::ClinkerQuery,
            ],
            JobType::ExtractClusters => &[JobType::Clinker],
            JobType::ClinkerQuery => &[JobType::ExtractClusters],
            JobType::Gne | JobType::ExtractSequences | JobType::Clinker => &[],
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown job type: {s}"))
    }
}

/// Status of a job row.
///
/// Legal paths: `waiting -> queued -> running -> finished|failed`, with
/// `queued` as the entry point for jobs without a dependency. A waiting job
/// whose predecessor failed moves straight to `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Waiting,
    Queued,
    Running,
    Finished,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }

    /// Initial status for a newly created row.
    pub fn initial(has_dependency: bool) -> Self {
        if has_dependency {
            JobStatus::Waiting
        } else {
            JobStatus::Queued
        }
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Waiting, JobStatus::Queued)
                | (JobStatus::Waiting, JobStatus::Failed)
                | (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Finished)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "waiting" => Ok(JobStatus::Waiting),
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "finished" => Ok(JobStatus::Finished),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Named aggregate counters, one increment per terminal job outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Statistic {
    Finished,
    Failed,
}

impl Statistic {
    pub const ALL: [Statistic; 2] = [Statistic::Finished, Statistic::Failed];

    pub fn as_str(self) -> &'static str {
        match self {
            Statistic::Finished => "finished",
            Statistic::Failed => "failed",
        }
    }

    /// Counter bumped when a job reaches the given terminal status.
    pub fn for_status(status: JobStatus) -> Option<Self> {
        match status {
            JobStatus::Finished => Some(Statistic::Finished),
            JobStatus::Failed => Some(Statistic::Failed),
            _ => None,
        }
    }
}

/// User supplied options of one job, rendered as tool flags.
pub type JobOptions = BTreeMap<String, OptionValue>;

/// A single option value as written in a batch file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Flag(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

impl OptionValue {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            OptionValue::Int(n) => u64::try_from(*n).ok(),
            OptionValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Single-line form used in the options record; line breaks and list
    /// items become commas.
    pub fn to_record(&self) -> String {
        match self {
            OptionValue::Text(s) => s
                .split(['\r', '\n'])
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(","),
            OptionValue::List(items) => items.join(","),
            other => other.to_string(),
        }
    }

    /// Shell arguments following `--<key>`. An enabled flag has none.
    pub fn to_args(&self) -> Vec<String> {
        match self {
            OptionValue::Flag(_) => Vec::new(),
            OptionValue::List(items) => items.clone(),
            other => vec![other.to_string()],
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Flag(b) => write!(f, "{b}"),
            OptionValue::Int(n) => write!(f, "{n}"),
            OptionValue::Float(x) => write!(f, "{x}"),
            OptionValue::Text(s) => f.write_str(s),
            OptionValue::List(items) => f.write_str(&items.join(" ")),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        OptionValue::Text(s.to_string())
    }
}

impl From<i64> for OptionValue {
    fn from(n: i64) -> Self {
        OptionValue::Int(n)
    }
}

impl From<bool> for OptionValue {
    fn from(b: bool) -> Self {
        OptionValue::Flag(b)
    }
}

/// Human-readable timestamp as shown on result pages and in notifications.
pub fn display_time(at: &DateTime<Utc>) -> String {
    at.format("%B %d %Y - %H:%M:%S").to_string()
}
