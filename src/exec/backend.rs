// src/exec/backend.rs

//! Pluggable tool invocation.
//!
//! Workers talk to a [`ToolInvoker`] instead of spawning processes directly,
//! so tests can swap in a scripted fake.
//!
//! [`ShellToolInvoker`] renders the `[tool.<job_type>]` command template,
//! records it in `logs/<id>_command.txt` and runs it through `sh -c` with
//! stdout and stderr appended to `logs/<id>.log`.
//!
//! Placeholders: `{job_id}`, `{job_dir}`, `{results}`, `{logs}`, `{uploads}`,
//! `{input}`, `{basis_results}` and `{options}`.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use regex::{Captures, Regex};

use crate::config::ToolConfig;
use crate::fs::FileSystem;
use crate::layout::JobPaths;
use crate::types::{JobId, JobOptions, JobType};

use super::task_runner::run_shell;

/// Everything a tool run needs to know about its job.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub job: JobId,
    pub job_type: JobType,
    pub paths: JobPaths,
    pub options: JobOptions,
    pub input: Option<PathBuf>,
    /// Results directory of the job this one builds on.
    pub basis_results: Option<PathBuf>,
}

/// Trait abstracting how a job's tool is executed.
pub trait ToolInvoker: Send + Sync + std::fmt::Debug {
    /// Run the tool to completion and return its exit code.
    ///
    /// `Err` means the tool could not be run at all. Dropping the future must
    /// stop the tool.
    fn invoke(
        &self,
        invocation: Invocation,
    ) -> Pin<Box<dyn Future<Output = Result<i32>> + Send + '_>>;
}

/// Runs configured shell command templates.
#[derive(Debug)]
pub struct ShellToolInvoker {
    tools: BTreeMap<JobType, ToolConfig>,
    placeholder: Regex,
    fs: Arc<dyn FileSystem>,
}

impl ShellToolInvoker {
    pub fn new(tools: BTreeMap<JobType, ToolConfig>, fs: Arc<dyn FileSystem>) -> Result<Self> {
        let placeholder = Regex::new(r"\{([a-z_]+)\}").context("compiling placeholder pattern")?;
        Ok(Self {
            tools,
            placeholder,
            fs,
        })
    }

    /// Render the command line for `invocation`.
    ///
    /// Options are inserted at `{options}`, or appended when the template
    /// has no such placeholder.
    pub fn render(&self, invocation: &Invocation) -> Result<String> {
        let tool = self
            .tools
            .get(&invocation.job_type)
            .ok_or_else(|| anyhow!("no [tool.{}] command configured", invocation.job_type))?;

        let options = render_options(&invocation.options);
        let paths = &invocation.paths;
        let mut unknown = Vec::new();

        let rendered = self
            .placeholder
            .replace_all(&tool.cmd, |caps: &Captures| match &caps[1] {
                "job_id" => invocation.job.to_string(),
                "job_dir" => quote(&paths.root.to_string_lossy()),
                "results" => quote(&paths.results.to_string_lossy()),
                "logs" => quote(&paths.logs.to_string_lossy()),
                "uploads" => quote(&paths.uploads.to_string_lossy()),
                "input" => optional_path(invocation.input.as_ref()),
                "basis_results" => optional_path(invocation.basis_results.as_ref()),
                "options" => options.clone(),
                other => {
                    unknown.push(other.to_string());
                    String::new()
                }
            })
            .into_owned();

        if !unknown.is_empty() {
            return Err(anyhow!(
                "unknown placeholder(s) in [tool.{}] command: {}",
                invocation.job_type,
                unknown.join(", ")
            ));
        }

        if tool.cmd.contains("{options}") || options.is_empty() {
            Ok(rendered)
        } else {
            Ok(format!("{rendered} {options}"))
        }
    }
}

impl ToolInvoker for ShellToolInvoker {
    fn invoke(
        &self,
        invocation: Invocation,
    ) -> Pin<Box<dyn Future<Output = Result<i32>> + Send + '_>> {
        Box::pin(async move {
            let cmd = self.render(&invocation)?;
            self.fs
                .write(&invocation.paths.command_file, cmd.as_bytes())
                .context("recording command")?;
            run_shell(&invocation.job, &cmd, &invocation.paths.log_file).await
        })
    }
}

/// `--key value` pairs; `true` flags become bare `--key`, `false` flags are
/// dropped.
pub fn render_options(options: &JobOptions) -> String {
    let mut args = Vec::new();
    for (key, value) in options {
        if let crate::types::OptionValue::Flag(false) = value {
            continue;
        }
        args.push(format!("--{key}"));
        args.extend(value.to_args().iter().map(|a| quote(a)));
    }
    args.join(" ")
}

fn optional_path(path: Option<&PathBuf>) -> String {
    path.map(|p| quote(&p.to_string_lossy())).unwrap_or_default()
}

/// Single-quote `s` for `sh` unless it only contains safe characters.
fn quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,+@%".contains(c));
    if safe {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}
