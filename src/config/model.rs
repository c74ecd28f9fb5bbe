// src/config/model.rs

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::{JobId, JobType};

/// Configuration exactly as read from TOML, before validation.
///
/// ```toml
/// [config]
/// jobs_dir = "jobs"
/// database = "jobs/jobchain.sqlite"
/// workers = 4
/// job_timeout = "8h"
///
/// [notify]
/// outbox = "outbox"
///
/// [thresholds]
/// maximum_gne_samples = 300
///
/// [tool.search]
/// cmd = "cblaster search --session_file {results}/{job_id}_session.json"
/// ```
///
/// Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: RawConfigSection,

    #[serde(default)]
    pub notify: NotifySection,

    #[serde(default)]
    pub thresholds: ThresholdSection,

    /// Extra or overriding `log signature -> user facing reason` entries.
    #[serde(default)]
    pub failure_reasons: BTreeMap<String, String>,

    /// `[tool.<job_type>]` sections keyed by job type name.
    #[serde(default)]
    pub tool: BTreeMap<String, ToolConfig>,
}

/// `[config]` section as written by the user.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigSection {
    #[serde(default = "default_jobs_dir")]
    pub jobs_dir: PathBuf,

    /// SQLite database file. Without it jobs live in memory only.
    #[serde(default)]
    pub database: Option<PathBuf>,

    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Duration string such as `"8h"` or `"90s"`.
    #[serde(default = "default_job_timeout")]
    pub job_timeout: String,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Jobs the retention sweeper never removes.
    #[serde(default = "default_persistent_jobs")]
    pub persistent_jobs: Vec<String>,

    #[serde(default)]
    pub maintenance_log_dir: Option<PathBuf>,

    #[serde(default)]
    pub reference_db_dir: Option<PathBuf>,

    #[serde(default)]
    pub progress_mode: ProgressMode,
}

fn default_jobs_dir() -> PathBuf {
    PathBuf::from("jobs")
}

fn default_workers() -> usize {
    2
}

fn default_job_timeout() -> String {
    "8h".to_string()
}

fn default_retention_days() -> u32 {
    31
}

fn default_persistent_jobs() -> Vec<String> {
    [
        "W885A828D304Y06",
        "N250X793I290S34",
        "M709G912A874A87",
        "K814Y501M103S02",
        "Y736N982T834D20",
        "V139R332L449N10",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for RawConfigSection {
    fn default() -> Self {
        Self {
            jobs_dir: default_jobs_dir(),
            database: None,
            workers: default_workers(),
            job_timeout: default_job_timeout(),
            retention_days: default_retention_days(),
            persistent_jobs: default_persistent_jobs(),
            maintenance_log_dir: None,
            reference_db_dir: None,
            progress_mode: ProgressMode::default(),
        }
    }
}

/// How the progress tracker counts stage markers found in a log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressMode {
    /// Every marker present anywhere in the log counts.
    #[default]
    Lenient,
    /// Only the leading run of markers found in order counts.
    Sequential,
}

/// `[notify]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotifySection {
    /// Directory receiving one text file per notification. Without it
    /// notifications are only logged.
    #[serde(default)]
    pub outbox: Option<PathBuf>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_footer")]
    pub footer: String,
}

fn default_base_url() -> String {
    "http://localhost:5000/".to_string()
}

fn default_footer() -> String {
    "Kind regards,\nThe jobchain team".to_string()
}

impl Default for NotifySection {
    fn default() -> Self {
        Self {
            outbox: None,
            base_url: default_base_url(),
            footer: default_footer(),
        }
    }
}

/// `[thresholds]` section: upper bounds on user controlled sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdSection {
    #[serde(default = "default_max_extract")]
    pub maximum_clusters_to_extract: u64,

    #[serde(default = "default_max_gne_samples")]
    pub maximum_gne_samples: u64,

    #[serde(default = "default_max_plot")]
    pub max_clusters_to_plot: u64,
}

fn default_max_extract() -> u64 {
    150
}

fn default_max_gne_samples() -> u64 {
    300
}

fn default_max_plot() -> u64 {
    75
}

impl Default for ThresholdSection {
    fn default() -> Self {
        Self {
            maximum_clusters_to_extract: default_max_extract(),
            maximum_gne_samples: default_max_gne_samples(),
            max_clusters_to_plot: default_max_plot(),
        }
    }
}

/// `[tool.<job_type>]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolConfig {
    /// Shell command template. Placeholders: `{job_id}`, `{job_dir}`,
    /// `{results}`, `{logs}`, `{uploads}`, `{input}`, `{options}`.
    pub cmd: String,
}

/// Validated `[config]` section.
#[derive(Debug, Clone)]
pub struct ConfigSection {
    pub jobs_dir: PathBuf,
    pub database: Option<PathBuf>,
    pub workers: usize,
    pub job_timeout: Duration,
    pub retention_days: u32,
    pub persistent_jobs: BTreeSet<JobId>,
    pub maintenance_log_dir: Option<PathBuf>,
    pub reference_db_dir: Option<PathBuf>,
    pub progress_mode: ProgressMode,
}

/// Validated configuration. Build it with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub notify: NotifySection,
    pub thresholds: ThresholdSection,
    /// Ordered `(signature, reason)` pairs; the first match wins.
    pub failure_reasons: Vec<(String, String)>,
    pub tool: BTreeMap<JobType, ToolConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        notify: NotifySection,
        thresholds: ThresholdSection,
        failure_reasons: Vec<(String, String)>,
        tool: BTreeMap<JobType, ToolConfig>,
    ) -> Self {
        Self {
            config,
            notify,
            thresholds,
            failure_reasons,
            tool,
        }
    }

    pub fn is_persistent(&self, id: &JobId) -> bool {
        self.config.persistent_jobs.contains(id)
    }
}
