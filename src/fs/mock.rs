// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir,
}

#[derive(Debug, Clone)]
struct MockNode {
    entry: MockEntry,
    modified: SystemTime,
}

/// In-memory filesystem for tests. Paths are used verbatim as keys.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    nodes: Arc<Mutex<BTreeMap<PathBuf, MockNode>>>,
    removal_errors: Arc<Mutex<BTreeMap<PathBuf, io::ErrorKind>>>,
}

fn not_found(path: &Path) -> anyhow::Error {
    anyhow::Error::new(io::Error::new(
        io::ErrorKind::NotFound,
        format!("not found: {:?}", path),
    ))
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn nodes(&self) -> MutexGuard<'_, BTreeMap<PathBuf, MockNode>> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref();
        let mut nodes = self.nodes();
        if let Some(parent) = path.parent() {
            Self::ensure_dirs(&mut nodes, parent);
        }
        nodes.insert(
            path.to_path_buf(),
            MockNode {
                entry: MockEntry::File(content.into()),
                modified: SystemTime::now(),
            },
        );
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        Self::ensure_dirs(&mut self.nodes(), path.as_ref());
    }

    /// Make `remove_dir_all(path)` fail with `kind`, leaving the tree intact.
    pub fn fail_removal(&self, path: impl AsRef<Path>, kind: io::ErrorKind) {
        self.removal_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.as_ref().to_path_buf(), kind);
    }

    /// Override the modification time of an existing entry.
    pub fn set_modified(&self, path: impl AsRef<Path>, at: SystemTime) {
        if let Some(node) = self.nodes().get_mut(path.as_ref()) {
            node.modified = at;
        }
    }

    fn ensure_dirs(nodes: &mut BTreeMap<PathBuf, MockNode>, path: &Path) {
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            nodes.entry(ancestor.to_path_buf()).or_insert_with(|| MockNode {
                entry: MockEntry::Dir,
                modified: SystemTime::now(),
            });
        }
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        match self.nodes().get(path).map(|n| &n.entry) {
            Some(MockEntry::File(content)) => Ok(content.clone()),
            Some(MockEntry::Dir) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(not_found(path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn append(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut existing = match self.read(path) {
            Ok(bytes) => bytes,
            Err(e) if super::is_not_found(&e) => Vec::new(),
            Err(e) => return Err(e),
        };
        existing.extend_from_slice(contents);
        self.add_file(path, existing);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.nodes().contains_key(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.nodes().get(path).map(|n| &n.entry), Some(MockEntry::File(_)))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.nodes().get(path).map(|n| &n.entry), Some(MockEntry::Dir))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let nodes = self.nodes();
        match nodes.get(path).map(|n| &n.entry) {
            Some(MockEntry::Dir) => Ok(nodes
                .keys()
                .filter(|p| p.parent() == Some(path))
                .cloned()
                .collect()),
            Some(MockEntry::File(_)) => Err(anyhow!("Not a directory: {:?}", path)),
            None => Err(not_found(path)),
        }
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.add_dir(path);
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        let injected = self
            .removal_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .copied();
        if let Some(kind) = injected {
            return Err(anyhow::Error::new(io::Error::new(
                kind,
                format!("cannot remove {:?}", path),
            )));
        }
        let mut nodes = self.nodes();
        if !matches!(nodes.get(path).map(|n| &n.entry), Some(MockEntry::Dir)) {
            return Err(not_found(path));
        }
        nodes.retain(|p, _| !p.starts_with(path));
        Ok(())
    }

    fn modified(&self, path: &Path) -> Result<SystemTime> {
        self.nodes()
            .get(path)
            .map(|n| n.modified)
            .ok_or_else(|| not_found(path))
    }
}
