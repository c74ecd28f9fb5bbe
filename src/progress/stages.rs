// src/progress/stages.rs

//! Canonical stage markers per job type.

use std::collections::BTreeSet;

use crate::types::JobType;

/// Text expected in a job log once a stage completed, plus the label shown
/// to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageMarker {
    pub marker: &'static str,
    pub label: &'static str,
}

const fn stage(marker: &'static str, label: &'static str) -> StageMarker {
    StageMarker { marker, label }
}

pub const INTERMEDIATE_GENES_FLAG: &str = "--intermediate_genes";
pub const RECOMPUTE_FLAG: &str = "--recompute";
pub const EXTRACT_SEQUENCES_FLAG: &str = "--extract_sequences";

const SEARCH: &[StageMarker] = &[
    stage("Launching new search", "Send search job to NCBI"),
    stage("Polling NCBI for completion status", "Polling NCBI"),
    stage("Retrieving results for search", "Retrieving results from NCBI"),
    stage("Parsing results", "Parsing results"),
    stage("Fetching genomic context of hits", "Fetching genomic context of hits"),
    stage("Writing current search session", "Writing results"),
    stage("INFO - Done.", "Done"),
];

const RECOMPUTE: &[StageMarker] = &[
    stage("Loading session(s)", "Loading session"),
    stage("Filtering session with new thresholds", "Filtering session with new thresholds"),
    stage("Writing recomputed session to", "Writing results"),
    stage("INFO - Done.", "Done"),
];

const GNE: &[StageMarker] = &[
    stage("Loading session from", "Loading session"),
    stage("Computing gene neighbourhood statistics", "Computing gene neighbourhood statistics"),
    stage("Writing GNE table to", "Writing results"),
    stage("INFO - Done.", "Done"),
];

const EXTRACT_CLUSTERS: &[StageMarker] = &[
    stage("Loading session from", "Loading session"),
    stage("Extracting clusters that match the filters", "Extracting clusters"),
    stage("Writing genbank files", "Writing genbank files"),
    stage("Querying NCBI", "Fetching sequences from NCBI"),
    stage("Clusters have been written to", "Writing results"),
    stage("INFO - Done!", "Done"),
];

const CLINKER_QUERY: &[StageMarker] = &[
    stage("Starting generation of cluster plot with clinker", "Generating cluster plot"),
    stage("INFO - Done!", "Done"),
];

const EXTRACT_SEQUENCES: &[StageMarker] = &[
    stage("Loading session from", "Loading session"),
    stage("Extracting subject sequences matching filters", "Extracting sequences"),
    stage("Writing output", "Writing results"),
    stage("INFO - Done!", "Done"),
];

const CLINKER: &[StageMarker] = &[
    stage("Parsing files:", "Parsing files"),
    stage("Starting cluster alignments", "Aligning clusters"),
    stage("Generating results", "Generating results"),
    stage("Saving session to", "Saving session"),
    stage("Writing to", "Writing results"),
    stage("INFO - Done!", "Done"),
];

const INTERMEDIATE_GENES: StageMarker = stage(
    "Searching for intermediate genes",
    "Fetching intermediate genes from NCBI",
);

const FETCH_SEQUENCES: StageMarker = stage("Querying NCBI", "Fetch sequences from NCBI");

/// Ordered stage list for `job_type`, adjusted for the flags found in the
/// recorded command.
pub fn stages_for(job_type: JobType, flags: &BTreeSet<String>) -> Vec<StageMarker> {
    let has = |flag: &str| flags.contains(flag);

    match job_type {
        JobType::Search => {
            let (base, insert_at) = if has(RECOMPUTE_FLAG) {
                (RECOMPUTE, 2)
            } else {
                (SEARCH, 5)
            };
            let mut stages = base.to_vec();
            if has(INTERMEDIATE_GENES_FLAG) {
                stages.insert(insert_at, INTERMEDIATE_GENES);
            }
            stages
        }
        JobType::Recompute => RECOMPUTE.to_vec(),
        JobType::Gne => GNE.to_vec(),
        JobType::ExtractClusters => EXTRACT_CLUSTERS.to_vec(),
        JobType::ClinkerQuery => CLINKER_QUERY.to_vec(),
        JobType::ExtractSequences => {
            let mut stages = EXTRACT_SEQUENCES.to_vec();
            if has(EXTRACT_SEQUENCES_FLAG) {
                stages.insert(2, FETCH_SEQUENCES);
            }
            stages
        }
        JobType::Clinker => CLINKER.to_vec(),
    }
}

/// Flags (`--name`) appearing in a recorded command line.
pub fn recorded_flags(command: &str) -> BTreeSet<String> {
    command
        .split_whitespace()
        .map(|token| token.trim_matches(|c| c == '\'' || c == '"'))
        .filter(|token| token.starts_with("--"))
        .map(|token| token.split('=').next().unwrap_or(token).to_string())
        .collect()
}
