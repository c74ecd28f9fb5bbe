// src/lineage/mod.rs

//! Lineage of submitted jobs: batch requests, linking, planning and
//! related-job navigation.

pub mod linker;
pub mod planner;
pub mod related;
pub mod request;

pub use linker::{LinkSlot, Lineage, Predecessor, RootRef, plan_links};
pub use planner::plan_visualization;
pub use related::{ConnectedJob, Relation, connected_jobs};
pub use request::{PendingJobRequest, load_batch, parse_batch};
