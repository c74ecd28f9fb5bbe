// src/exec/archive.rs

//! Result packaging: a manifest of every file in the job directory.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::fs::FileSystem;
use crate::layout::JobPaths;

/// Write `results/<id>_manifest.txt` with one `<blake3>  <relative path>`
/// line per file. Returns the number of files listed.
pub fn write_manifest(fs: &dyn FileSystem, paths: &JobPaths) -> Result<usize> {
    let mut files = Vec::new();
    collect_files(fs, &paths.root, &mut files)?;
    files.retain(|p| p != &paths.manifest);
    files.sort();

    let mut out = String::new();
    for file in &files {
        let digest = blake3::hash(&fs.read(file)?);
        let relative = file.strip_prefix(&paths.root).unwrap_or(file);
        out.push_str(&format!("{}  {}\n", digest.to_hex(), relative.display()));
    }

    fs.write(&paths.manifest, out.as_bytes())?;
    Ok(files.len())
}

fn collect_files(fs: &dyn FileSystem, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs.read_dir(dir)? {
        if fs.is_dir(&entry) {
            collect_files(fs, &entry, out)?;
        } else if fs.is_file(&entry) {
            out.push(entry);
        }
    }
    Ok(())
}
