// src/refdb.rs

//! Cache of the reference databases available for searches.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::errors::{JobchainError, Result};
use crate::fs::FileSystem;

pub const ORGANISMS: [&str; 2] = ["prokaryota", "fungi"];

/// Capitalised organism -> sorted genus names.
pub type DatabaseMap = BTreeMap<String, Vec<String>>;

/// Lock-protected snapshot of `<root>/<organism>/<genus>.*`.
#[derive(Debug)]
pub struct ReferenceDatabases {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    cache: RwLock<DatabaseMap>,
}

impl ReferenceDatabases {
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            root: root.into(),
            fs,
            cache: RwLock::new(DatabaseMap::new()),
        }
    }

    /// Rescan the database directory and replace the cached map.
    pub fn refresh(&self) -> Result<DatabaseMap> {
        let mut map = DatabaseMap::new();

        for organism_dir in self.fs.read_dir(&self.root)? {
            if !self.fs.is_dir(&organism_dir) {
                continue;
            }
            let Some(organism) = organism_dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if organism == "logs" {
                continue;
            }
            if !ORGANISMS.contains(&organism) {
                return Err(JobchainError::ConfigError(format!(
                    "unexpected organism folder '{organism}' in {}",
                    self.root.display()
                )));
            }

            let mut genera: Vec<String> = self
                .fs
                .read_dir(&organism_dir)?
                .iter()
                .filter(|p| self.fs.is_file(p))
                .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
                .collect();
            genera.sort();
            genera.dedup();

            map.entry(capitalise(organism)).or_default().extend(genera);
        }

        let mut cache = self
            .cache
            .write()
            .map_err(|_| JobchainError::ConfigError("reference database cache poisoned".into()))?;
        *cache = map.clone();
        info!(organisms = map.len(), "reference databases refreshed");
        Ok(map)
    }

    pub fn snapshot(&self) -> Result<DatabaseMap> {
        self.cache
            .read()
            .map(|m| m.clone())
            .map_err(|_| JobchainError::ConfigError("reference database cache poisoned".into()))
    }
}

fn capitalise(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
