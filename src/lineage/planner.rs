// src/lineage/planner.rs

use tracing::debug;

use crate::errors::{JobchainError, Result};
use crate::lineage::request::PendingJobRequest;
use crate::store::JobStore;
use crate::types::{JobId, JobOptions, JobType};

/// Default cluster cap for an implicit extraction step.
pub const IMPLICIT_EXTRACTION_MAX_CLUSTERS: i64 = 150;

/// Build the batch for a cluster visualization of `basis`.
///
/// The visualization needs extracted clusters as input. If `basis` is not an
/// extraction job, an `extract_clusters` step with default options is
/// inserted first and the visualization waits for it.
pub fn plan_visualization(
    store: &dyn JobStore,
    basis: &JobId,
    options: JobOptions,
    title: Option<String>,
    email: Option<String>,
) -> Result<Vec<PendingJobRequest>> {
    let basis_job = store
        .get(basis)?
        .ok_or_else(|| JobchainError::Reference(basis.clone()))?;

    let mut visualize = PendingJobRequest::new(JobType::Clinker);
    visualize.options = options;
    visualize.title = title;
    visualize.email = email;

    if basis_job.job_type == JobType::ExtractClusters {
        visualize.basis = Some(basis.clone());
        return Ok(vec![visualize]);
    }

    debug!(basis = %basis, basis_type = %basis_job.job_type, "inserting implicit cluster extraction");
    let extract = PendingJobRequest::new(JobType::ExtractClusters)
        .with_basis(basis.clone())
        .with_option("format", "genbank")
        .with_option("maxclusters", IMPLICIT_EXTRACTION_MAX_CLUSTERS);

    Ok(vec![extract, visualize.after(0)])
}
