// src/layout.rs

//! On-disk layout of a job directory.
//!
//! ```text
//! <jobs_dir>/<id>/
//!   uploads/
//!   results/<id>_manifest.txt
//!   logs/<id>_command.txt
//!   logs/<id>_options.txt
//!   logs/<id>_payload.toml
//!   logs/<id>.log
//! ```

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::fs::FileSystem;
use crate::queue::QueuePayload;
use crate::types::{JobId, JobOptions};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    pub root: PathBuf,
    pub uploads: PathBuf,
    pub results: PathBuf,
    pub logs: PathBuf,
    pub command_file: PathBuf,
    pub options_file: PathBuf,
    pub payload_file: PathBuf,
    pub log_file: PathBuf,
    pub manifest: PathBuf,
}

impl JobPaths {
    pub fn new(jobs_dir: &Path, id: &JobId) -> Self {
        let root = jobs_dir.join(id.as_str());
        let uploads = root.join("uploads");
        let results = root.join("results");
        let logs = root.join("logs");
        Self {
            command_file: logs.join(format!("{id}_command.txt")),
            options_file: logs.join(format!("{id}_options.txt")),
            payload_file: logs.join(format!("{id}_payload.toml")),
            log_file: logs.join(format!("{id}.log")),
            manifest: results.join(format!("{id}_manifest.txt")),
            root,
            uploads,
            results,
            logs,
        }
    }

    /// Create `uploads/`, `results/` and `logs/`.
    pub fn create(&self, fs: &dyn FileSystem) -> Result<()> {
        fs.create_dir_all(&self.uploads)?;
        fs.create_dir_all(&self.results)?;
        fs.create_dir_all(&self.logs)?;
        Ok(())
    }

    /// Record the submitted options, one `key,value` line each.
    pub fn write_options(&self, fs: &dyn FileSystem, options: &JobOptions) -> Result<()> {
        let mut out = String::new();
        for (key, value) in options {
            out.push_str(key);
            out.push(',');
            out.push_str(&value.to_record());
            out.push('\n');
        }
        fs.write(&self.options_file, out.as_bytes())
    }

    pub fn write_payload(&self, fs: &dyn FileSystem, payload: &QueuePayload) -> Result<()> {
        let text = toml::to_string(payload)?;
        fs.write(&self.payload_file, text.as_bytes())
    }

    /// Read back the queue payload saved at submission.
    pub fn read_payload(&self, fs: &dyn FileSystem) -> Result<QueuePayload> {
        let text = fs.read_to_string(&self.payload_file)?;
        Ok(toml::from_str(&text)?)
    }

    /// Append a line to the job log.
    pub fn append_log(&self, fs: &dyn FileSystem, line: &str) -> Result<()> {
        let mut text = line.to_string();
        if !text.ends_with('\n') {
            text.push('\n');
        }
        fs.append(&self.log_file, text.as_bytes())
    }
}
