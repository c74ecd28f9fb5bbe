// src/failure.rs

//! Best-effort explanation of why a job failed, derived from its log.

use tracing::debug;

use crate::fs::{FileSystem, is_not_found};
use crate::layout::JobPaths;

pub const NO_LOG_REASON: &str = "Command construction failed (no log file).";
pub const UNKNOWN_REASON: &str = "Unknown failure reason.";

/// Built-in `(log signature, reason)` table.
pub fn default_failure_reasons() -> Vec<(String, String)> {
    [
        (
            "ERROR - No valid profiles could be selected",
            "No valid HMM profiles have been entered. Check your HMM profiles for potential spelling errors.",
        ),
        (
            "ValueError: Search completed, but found no hits",
            "Your search with the specified parameters did not return any hits. Check your input, and try to loosen your search parameters to get results.",
        ),
        (
            "Too many selected clusters",
            "You have selected too many clusters to use in your downstream analysis. Check the maximum number of clusters for the analysis you were trying to execute, and try again.",
        ),
        (
            "Too many samples",
            "You set the value for the number of samples parameter too high. Change it to the maximum value and try again.",
        ),
    ]
    .iter()
    .map(|(sig, reason)| (sig.to_string(), reason.to_string()))
    .collect()
}

/// Map the first known signature found in `log` to its reason.
pub fn reason_from_log<'a>(log: &str, table: &'a [(String, String)]) -> Option<&'a str> {
    table
        .iter()
        .find(|(sig, _)| log.contains(sig.as_str()))
        .map(|(_, reason)| reason.as_str())
}

/// Human-readable failure reason for the job at `paths`.
pub fn failure_reason(fs: &dyn FileSystem, paths: &JobPaths, table: &[(String, String)]) -> String {
    match fs.read_to_string(&paths.log_file) {
        Ok(log) => reason_from_log(&log, table)
            .unwrap_or(UNKNOWN_REASON)
            .to_string(),
        Err(e) if is_not_found(&e) => NO_LOG_REASON.to_string(),
        Err(e) => {
            debug!(error = %e, "could not read job log for failure reason");
            UNKNOWN_REASON.to_string()
        }
    }
}
