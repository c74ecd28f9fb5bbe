// src/ids.rs

//! Identifier Generator.
//!
//! Ids are 15 characters long; every 4th position (0-indexed) is an uppercase
//! letter and every other position a digit, e.g. `W885A828D304Y06`.
//!
//! Uniqueness is enforced by the store at insert time: [`insert_with_fresh_id`]
//! draws a candidate, lets the store insert the row, and re-draws on
//! [`JobchainError::IdConflict`]. Two concurrent submissions can therefore
//! never both succeed with the same id.

use rand::Rng;
use tracing::{debug, warn};

use crate::errors::{JobchainError, Result};
use crate::store::{Job, JobStore};
use crate::types::JobId;

pub const ID_LENGTH: usize = 15;

const MAX_ATTEMPTS: usize = 1024;

/// Whether `s` has the shape of a generated id.
pub fn is_well_formed(s: &str) -> bool {
    s.len() == ID_LENGTH
        && s.bytes().enumerate().all(|(i, b)| {
            if i % 4 == 0 {
                b.is_ascii_uppercase()
            } else {
                b.is_ascii_digit()
            }
        })
}

/// Draw one candidate id. Not checked against the store.
pub fn candidate<R: Rng + ?Sized>(rng: &mut R) -> JobId {
    let id: String = (0..ID_LENGTH)
        .map(|i| {
            if i % 4 == 0 {
                rng.gen_range(b'A'..=b'Z') as char
            } else {
                rng.gen_range(b'0'..=b'9') as char
            }
        })
        .collect();
    JobId::new(id)
}

/// Draw ids until one has never been issued by `store`.
///
/// The result is not reserved; callers that persist a row should use
/// [`insert_with_fresh_id`] instead.
pub fn generate_id(store: &dyn JobStore) -> Result<JobId> {
    let mut rng = rand::thread_rng();
    for _ in 0..MAX_ATTEMPTS {
        let id = candidate(&mut rng);
        if !store.id_issued(&id)? {
            return Ok(id);
        }
        debug!(id = %id, "generated id already issued; drawing again");
    }
    Err(exhausted())
}

/// Insert the row produced by `build` under a freshly drawn id, re-drawing
/// whenever the store reports the id as taken. Returns the stored row.
pub fn insert_with_fresh_id<F>(store: &dyn JobStore, mut build: F) -> Result<Job>
where
    F: FnMut(JobId) -> Job,
{
    for _ in 0..MAX_ATTEMPTS {
        let id = candidate(&mut rand::thread_rng());
        let job = build(id);
        match store.insert(&job) {
            Ok(()) => return Ok(job),
            Err(JobchainError::IdConflict(id)) => {
                debug!(id = %id, "id conflict on insert; drawing again");
            }
            Err(e) => return Err(e),
        }
    }
    Err(exhausted())
}

fn exhausted() -> JobchainError {
    warn!(attempts = MAX_ATTEMPTS, "could not find an unused job id");
    JobchainError::StoreUnavailable(format!(
        "no unused job id found after {MAX_ATTEMPTS} attempts"
    ))
}
