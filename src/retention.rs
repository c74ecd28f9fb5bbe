// src/retention.rs

//! Retention Sweeper: removes expired job directories and their rows.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::fs::{FileSystem, is_not_found};
use crate::store::JobStore;
use crate::types::JobId;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Jobs whose directory was removed (or would be, on a dry run).
    pub deleted: Vec<JobId>,
    /// Expired jobs whose directory could not be removed; their rows are kept.
    pub failed: Vec<JobId>,
    /// Expired jobs kept because they are on the allow-list.
    pub kept_persistent: Vec<JobId>,
    /// Entries that are not job directories.
    pub skipped: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    store: Arc<dyn JobStore>,
    fs: Arc<dyn FileSystem>,
    jobs_dir: PathBuf,
    persistent: BTreeSet<JobId>,
    maintenance_log_dir: Option<PathBuf>,
}

impl RetentionSweeper {
    pub fn new(
        store: Arc<dyn JobStore>,
        fs: Arc<dyn FileSystem>,
        jobs_dir: impl Into<PathBuf>,
        persistent: BTreeSet<JobId>,
        maintenance_log_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            store,
            fs,
            jobs_dir: jobs_dir.into(),
            persistent,
            maintenance_log_dir,
        }
    }

    pub fn sweep(&self, retention_days: u32) -> Result<SweepReport> {
        self.sweep_at(SystemTime::now(), retention_days, false)
    }

    /// Sweep as if the current time were `now`. With `dry_run`, nothing is
    /// removed and the report lists what would be.
    pub fn sweep_at(
        &self,
        now: SystemTime,
        retention_days: u32,
        dry_run: bool,
    ) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        let entries = match self.fs.read_dir(&self.jobs_dir) {
            Ok(entries) => entries,
            Err(e) if is_not_found(&e) => {
                info!(dir = %self.jobs_dir.display(), "jobs directory missing; nothing to sweep");
                return Ok(report);
            }
            Err(e) => return Err(e.into()),
        };

        for dir in entries {
            let Some(id) = job_id_of(&dir) else {
                debug!(path = %dir.display(), "not a job directory; skipping");
                report.skipped.push(dir);
                continue;
            };
            if !self.fs.is_dir(&dir) {
                report.skipped.push(dir);
                continue;
            }

            let modified = match self.fs.modified(&dir) {
                Ok(t) => t,
                Err(e) if is_not_found(&e) => {
                    debug!(job = %id, "job directory vanished during sweep");
                    continue;
                }
                Err(e) => {
                    warn!(job = %id, error = %e, "cannot read job directory age; skipping");
                    continue;
                }
            };

            let age_days = now
                .duration_since(modified)
                .unwrap_or(Duration::ZERO)
                .as_secs()
                / SECONDS_PER_DAY;
            if age_days < u64::from(retention_days) {
                continue;
            }

            if self.persistent.contains(&id) {
                debug!(job = %id, age_days, "expired job is persistent; keeping");
                report.kept_persistent.push(id);
                continue;
            }

            if dry_run {
                info!(job = %id, age_days, "would remove expired job");
                report.deleted.push(id);
                continue;
            }

            match self.remove(&id, &dir) {
                Ok(()) => {
                    info!(job = %id, age_days, "removed expired job");
                    report.deleted.push(id);
                }
                Err(e) => {
                    warn!(job = %id, error = %e, "could not remove expired job; keeping its row");
                    report.failed.push(id);
                }
            }
        }

        if !dry_run && !(report.deleted.is_empty() && report.failed.is_empty()) {
            self.write_maintenance_log(now, &report);
        }
        Ok(report)
    }

    /// Remove the directory, then the row. A directory that is already gone
    /// counts as removed.
    fn remove(&self, id: &JobId, dir: &Path) -> Result<()> {
        match self.fs.remove_dir_all(dir) {
            Ok(()) => {}
            Err(e) if is_not_found(&e) => {
                debug!(job = %id, "job directory already removed");
            }
            Err(e) => return Err(e.into()),
        }
        if !self.store.delete(id)? {
            debug!(job = %id, "no row for removed job directory");
        }
        Ok(())
    }

    fn write_maintenance_log(&self, now: SystemTime, report: &SweepReport) {
        let Some(dir) = &self.maintenance_log_dir else {
            return;
        };
        let now: DateTime<Utc> = now.into();
        let path = dir.join(format!("{}_removal.txt", now.format("%Y-%m-%d")));

        let mut text = format!("Removal run at {}\n", now.to_rfc3339());
        for id in &report.deleted {
            text.push_str(&format!("Removed {id}\n"));
        }
        for id in &report.failed {
            text.push_str(&format!("Could not remove {id}\n"));
        }
        if let Err(e) = self.fs.append(&path, text.as_bytes()) {
            warn!(path = %path.display(), error = %e, "could not write maintenance log");
        }
    }
}

fn job_id_of(dir: &Path) -> Option<JobId> {
    let name = dir.file_name()?.to_str()?;
    let id = JobId::new(name);
    id.is_well_formed().then_some(id)
}
