// src/exec/thresholds.rs

//! Size limits checked before a tool is invoked.

use std::fmt;
use std::path::Path;

use anyhow::Result;

use crate::config::ThresholdSection;
use crate::fs::FileSystem;
use crate::types::{JobOptions, JobType, OptionValue};

/// Exit code recorded for a job rejected by a threshold.
pub const THRESHOLD_EXIT_CODE: i32 = 999;

pub const TOO_MANY_CLUSTERS: &str = "Too many selected clusters";
pub const TOO_MANY_SAMPLES: &str = "Too many samples";

const MANIFEST_SUFFIX: &str = "_manifest.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdViolation {
    pub signature: &'static str,
    pub value: u64,
    pub limit: u64,
}

impl fmt::Display for ThresholdViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} > {})", self.signature, self.value, self.limit)
    }
}

/// Check the user controlled sizes of a job against `limits`.
///
/// `input_files` is the number of files a `clinker` job would read; other
/// job types ignore it.
pub fn check(
    job_type: JobType,
    options: &JobOptions,
    input_files: Option<u64>,
    limits: &ThresholdSection,
) -> Option<ThresholdViolation> {
    let (signature, value, limit) = match job_type {
        JobType::Gne => (
            TOO_MANY_SAMPLES,
            options.get("sample_number").and_then(OptionValue::as_u64)?,
            limits.maximum_gne_samples,
        ),
        JobType::ExtractClusters => (
            TOO_MANY_CLUSTERS,
            options.get("maxclusters").and_then(OptionValue::as_u64)?,
            limits.maximum_clusters_to_extract,
        ),
        JobType::ClinkerQuery => (
            TOO_MANY_CLUSTERS,
            options.get("maxclusters").and_then(OptionValue::as_u64)?,
            limits.max_clusters_to_plot,
        ),
        JobType::Clinker => (TOO_MANY_CLUSTERS, input_files?, limits.max_clusters_to_plot),
        JobType::Search | JobType::Recompute | JobType::ExtractSequences => return None,
    };

    (value > limit).then_some(ThresholdViolation {
        signature,
        value,
        limit,
    })
}

/// Count the cluster files in `dir`, ignoring result manifests.
pub fn count_input_files(fs: &dyn FileSystem, dir: &Path) -> Result<u64> {
    let mut count = 0;
    for entry in fs.read_dir(dir)? {
        let is_manifest = entry
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(MANIFEST_SUFFIX));
        if fs.is_file(&entry) && !is_manifest {
            count += 1;
        }
    }
    Ok(count)
}
