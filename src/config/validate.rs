// src/config/validate.rs

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::config::model::{ConfigFile, ConfigSection, RawConfigFile, RawConfigSection};
use crate::errors::{JobchainError, Result};
use crate::failure::default_failure_reasons;
use crate::types::{JobId, JobType};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = JobchainError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let config = validate_config_section(&raw.config)?;
        validate_thresholds(&raw)?;
        validate_notify(&raw)?;
        let tool = validate_tools(&raw)?;
        let failure_reasons = merge_failure_reasons(&raw.failure_reasons)?;

        Ok(ConfigFile::new_unchecked(
            config,
            raw.notify,
            raw.thresholds,
            failure_reasons,
            tool,
        ))
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        let raw = RawConfigFile::default();
        let config = ConfigSection {
            jobs_dir: raw.config.jobs_dir,
            database: None,
            workers: raw.config.workers,
            job_timeout: Duration::from_secs(8 * 60 * 60),
            retention_days: raw.config.retention_days,
            persistent_jobs: raw
                .config
                .persistent_jobs
                .into_iter()
                .map(JobId::new)
                .collect(),
            maintenance_log_dir: None,
            reference_db_dir: None,
            progress_mode: raw.config.progress_mode,
        };
        ConfigFile::new_unchecked(
            config,
            raw.notify,
            raw.thresholds,
            default_failure_reasons(),
            BTreeMap::new(),
        )
    }
}

fn validate_config_section(raw: &RawConfigSection) -> Result<ConfigSection> {
    if raw.workers == 0 {
        return Err(JobchainError::ConfigError(
            "[config].workers must be >= 1 (got 0)".to_string(),
        ));
    }

    if raw.retention_days == 0 {
        return Err(JobchainError::ConfigError(
            "[config].retention_days must be >= 1 (got 0)".to_string(),
        ));
    }

    if raw.jobs_dir.as_os_str().is_empty() {
        return Err(JobchainError::ConfigError(
            "[config].jobs_dir must not be empty".to_string(),
        ));
    }

    let job_timeout = parse_duration(&raw.job_timeout).map_err(|e| {
        JobchainError::ConfigError(format!("[config].job_timeout: {e}"))
    })?;
    if job_timeout.is_zero() {
        return Err(JobchainError::ConfigError(
            "[config].job_timeout must be greater than zero".to_string(),
        ));
    }

    let mut persistent_jobs = BTreeSet::new();
    for id in &raw.persistent_jobs {
        let id = JobId::new(id.trim());
        if !id.is_well_formed() {
            return Err(JobchainError::ConfigError(format!(
                "[config].persistent_jobs contains malformed job id '{id}'"
            )));
        }
        persistent_jobs.insert(id);
    }

    Ok(ConfigSection {
        jobs_dir: raw.jobs_dir.clone(),
        database: raw.database.clone(),
        workers: raw.workers,
        job_timeout,
        retention_days: raw.retention_days,
        persistent_jobs,
        maintenance_log_dir: raw.maintenance_log_dir.clone(),
        reference_db_dir: raw.reference_db_dir.clone(),
        progress_mode: raw.progress_mode,
    })
}

fn validate_thresholds(raw: &RawConfigFile) -> Result<()> {
    let t = &raw.thresholds;
    for (name, value) in [
        ("maximum_clusters_to_extract", t.maximum_clusters_to_extract),
        ("maximum_gne_samples", t.maximum_gne_samples),
        ("max_clusters_to_plot", t.max_clusters_to_plot),
    ] {
        if value == 0 {
            return Err(JobchainError::ConfigError(format!(
                "[thresholds].{name} must be >= 1 (got 0)"
            )));
        }
    }
    Ok(())
}

fn validate_notify(raw: &RawConfigFile) -> Result<()> {
    if !raw.notify.base_url.ends_with('/') {
        return Err(JobchainError::ConfigError(format!(
            "[notify].base_url must end with '/' (got '{}')",
            raw.notify.base_url
        )));
    }
    Ok(())
}

fn validate_tools(raw: &RawConfigFile) -> Result<BTreeMap<JobType, crate::config::ToolConfig>> {
    let mut tools = BTreeMap::new();
    for (name, tool) in raw.tool.iter() {
        let job_type: JobType = name.parse().map_err(|_| {
            JobchainError::ConfigError(format!(
                "[tool.{name}] does not name a known job type"
            ))
        })?;
        if tool.cmd.trim().is_empty() {
            return Err(JobchainError::ConfigError(format!(
                "[tool.{name}].cmd must not be empty"
            )));
        }
        tools.insert(job_type, tool.clone());
    }
    Ok(tools)
}

fn merge_failure_reasons(extra: &BTreeMap<String, String>) -> Result<Vec<(String, String)>> {
    let mut reasons = default_failure_reasons();
    for (signature, reason) in extra {
        if signature.trim().is_empty() {
            return Err(JobchainError::ConfigError(
                "[failure_reasons] keys must not be empty".to_string(),
            ));
        }
        match reasons.iter_mut().find(|(sig, _)| sig == signature) {
            Some(entry) => entry.1 = reason.clone(),
            None => reasons.push((signature.clone(), reason.clone())),
        }
    }
    Ok(reasons)
}

/// Parse a duration string like `"500ms"`, `"3s"`, `"2m"` or `"8h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let seconds = |factor: u64| {
        value
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{}' is too large", s))
    };

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => seconds(60),
        "h" => seconds(60 * 60),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
