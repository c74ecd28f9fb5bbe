// src/exec/task_runner.rs

//! Single tool process runner.

use std::fs::OpenOptions;
use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::{info, warn};

use crate::types::JobId;

/// Run `cmd` through the platform shell, appending stdout and stderr to
/// `log_file`, and return the exit code.
///
/// The child is killed if the returned future is dropped (e.g. on timeout).
pub async fn run_shell(job: &JobId, cmd: &str, log_file: &Path) -> Result<i32> {
    info!(job = %job, cmd = %cmd, "starting tool process");

    if let Some(parent) = log_file.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating log dir {:?}", parent))?;
    }
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("opening log file {:?}", log_file))?;
    let log_err = log
        .try_clone()
        .with_context(|| format!("duplicating log handle {:?}", log_file))?;

    let mut command = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    };

    command
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .with_context(|| format!("spawning tool process for job {job}"))?;

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for tool process of job {job}"))?;

    let code = match status.code() {
        Some(code) => code,
        None => {
            warn!(job = %job, "tool process terminated by signal");
            -1
        }
    };

    info!(job = %job, exit_code = code, success = status.success(), "tool process exited");
    Ok(code)
}
