// src/lineage/linker.rs

//! Dependency Linker.
//!
//! Linking happens in two steps so that a batch is rejected before anything
//! is written:
//!
//! 1. [`plan_links`] validates the batch and resolves every `basis` against
//!    the store. Roots are described relative to the batch ([`RootRef`]).
//! 2. [`LinkSlot::resolve`] turns a slot into concrete lineage fields once
//!    the ids of the earlier batch members are known.
//!
//! `main_search_job` is always flattened to the ultimate root.
//!
//! A stored basis that already finished is only a logical dependency. One
//! that is still waiting, queued or running becomes the predecessor of the
//! new job, which then waits on the basis's queue entry. A failed basis is
//! rejected.

use tracing::debug;

use crate::errors::{JobchainError, Result};
use crate::lineage::request::PendingJobRequest;
use crate::store::JobStore;
use crate::types::{JobId, JobStatus, QueueRef};

/// Where a request's lineage root lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootRef {
    /// The request starts a new lineage tree.
    SelfRoot,
    /// Root is a job already in the store.
    Stored(JobId),
    /// Root is the request at this index of the same batch.
    Batch(usize),
}

/// Job a request has to wait for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predecessor {
    /// The request at this index of the same batch.
    Batch(usize),
    /// A stored job that has not ended yet.
    Stored { id: JobId, queue_ref: QueueRef },
}

/// Lineage of one request, relative to its batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSlot {
    pub root: RootRef,
    pub predecessor: Option<Predecessor>,
}

/// Concrete lineage fields for a job row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Lineage {
    pub main_search_job: Option<JobId>,
    pub depending_on: Option<JobId>,
}

impl LinkSlot {
    /// `ids` holds the ids already assigned to the earlier batch members.
    pub fn resolve(&self, ids: &[JobId]) -> Result<Lineage> {
        let lookup = |index: usize| {
            ids.get(index).cloned().ok_or_else(|| {
                JobchainError::InvalidBatch(format!("batch entry {index} has no id yet"))
            })
        };

        let main_search_job = match &self.root {
            RootRef::SelfRoot => None,
            RootRef::Stored(id) => Some(id.clone()),
            RootRef::Batch(index) => Some(lookup(*index)?),
        };
        let depending_on = match &self.predecessor {
            None => None,
            Some(Predecessor::Batch(index)) => Some(lookup(*index)?),
            Some(Predecessor::Stored { id, .. }) => Some(id.clone()),
        };

        Ok(Lineage {
            main_search_job,
            depending_on,
        })
    }
}

/// Validate `batch` and compute each request's lineage slot.
///
/// Fails with [`JobchainError::Reference`] if a `basis` is not in the store,
/// and with [`JobchainError::InvalidBatch`] for malformed chains or a failed
/// basis. Performs no writes.
pub fn plan_links(store: &dyn JobStore, batch: &[PendingJobRequest]) -> Result<Vec<LinkSlot>> {
    if batch.is_empty() {
        return Err(JobchainError::EmptyBatch);
    }

    let mut slots: Vec<LinkSlot> = Vec::with_capacity(batch.len());

    for (index, request) in batch.iter().enumerate() {
        if let Some(after) = request.after {
            if after >= index {
                return Err(JobchainError::InvalidBatch(format!(
                    "entry {index} ({}) can only follow an earlier entry, not {after}",
                    request.job_type
                )));
            }
        }

        let slot = if request.job_type.is_root_type() {
            if request.basis.is_some() || request.after.is_some() {
                return Err(JobchainError::InvalidBatch(format!(
                    "entry {index}: a {} job always starts a new lineage",
                    request.job_type
                )));
            }
            LinkSlot {
                root: RootRef::SelfRoot,
                predecessor: None,
            }
        } else if let Some(basis) = &request.basis {
            let resolved = store
                .get(basis)?
                .ok_or_else(|| JobchainError::Reference(basis.clone()))?;

            if !resolved.job_type.downstream().contains(&request.job_type) {
                return Err(JobchainError::InvalidBatch(format!(
                    "entry {index}: a {} job cannot follow {} job {}",
                    request.job_type, resolved.job_type, resolved.id
                )));
            }

            let predecessor = match (request.after, resolved.status) {
                (Some(after), _) => Some(Predecessor::Batch(after)),
                (None, JobStatus::Finished) => None,
                (None, JobStatus::Failed) => {
                    return Err(JobchainError::InvalidBatch(format!(
                        "entry {index}: basis job {} failed and has no results",
                        resolved.id
                    )));
                }
                (None, _) => {
                    let queue_ref = resolved.queue_ref.ok_or_else(|| {
                        JobchainError::InvalidBatch(format!(
                            "entry {index}: basis job {} is {} but has no queue entry",
                            resolved.id, resolved.status
                        ))
                    })?;
                    Some(Predecessor::Stored {
                        id: resolved.id.clone(),
                        queue_ref,
                    })
                }
            };

            LinkSlot {
                root: RootRef::Stored(resolved.root_id().clone()),
                predecessor,
            }
        } else if let Some(after) = request.after {
            let root = match &slots[after].root {
                RootRef::SelfRoot => RootRef::Batch(after),
                other => other.clone(),
            };
            LinkSlot {
                root,
                predecessor: Some(Predecessor::Batch(after)),
            }
        } else if request.job_type.requires_basis() {
            return Err(JobchainError::InvalidBatch(format!(
                "entry {index}: a {} job needs a basis job or a preceding entry",
                request.job_type
            )));
        } else {
            LinkSlot {
                root: RootRef::SelfRoot,
                predecessor: None,
            }
        };

        debug!(index, job_type = %request.job_type, ?slot, "linked batch entry");
        slots.push(slot);
    }

    Ok(slots)
}
