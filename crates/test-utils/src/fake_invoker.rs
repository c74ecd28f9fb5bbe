use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use jobchain::exec::backend::render_options;
use jobchain::exec::{Invocation, ToolInvoker};
use jobchain::fs::FileSystem;
use jobchain::types::{JobId, JobType};

/// What the fake tool does for one job type.
#[derive(Debug, Clone)]
pub struct Script {
    pub log: String,
    pub exit_code: i32,
    pub delay: Duration,
    /// Fail to start the tool at all.
    pub error: Option<String>,
}

impl Script {
    pub fn success(log: &str) -> Self {
        Self {
            log: log.to_string(),
            exit_code: 0,
            delay: Duration::ZERO,
            error: None,
        }
    }

    pub fn exit(code: i32, log: &str) -> Self {
        Self {
            exit_code: code,
            ..Self::success(log)
        }
    }

    pub fn hang(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::success("")
        }
    }
}

/// A fake tool invoker that:
/// - records every invocation, in order
/// - writes a command file and the scripted log text
/// - returns the scripted exit code.
#[derive(Debug)]
pub struct ScriptedInvoker {
    fs: Arc<dyn FileSystem>,
    scripts: Mutex<HashMap<JobType, Script>>,
    invoked: Arc<Mutex<Vec<Invocation>>>,
}

impl ScriptedInvoker {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            scripts: Mutex::new(HashMap::new()),
            invoked: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn script(self, job_type: JobType, script: Script) -> Self {
        self.scripts.lock().unwrap().insert(job_type, script);
        self
    }

    pub fn invoked(&self) -> Vec<(JobId, JobType)> {
        self.invocations()
            .into_iter()
            .map(|i| (i.job, i.job_type))
            .collect()
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invoked.lock().unwrap().clone()
    }
}

impl ToolInvoker for ScriptedInvoker {
    fn invoke(
        &self,
        invocation: Invocation,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<i32>> + Send + '_>> {
        Box::pin(async move {
            self.invoked.lock().unwrap().push(invocation.clone());

            let script = self
                .scripts
                .lock()
                .unwrap()
                .get(&invocation.job_type)
                .cloned()
                .unwrap_or_else(|| Script::success("INFO - Done."));

            if let Some(reason) = script.error {
                return Err(anyhow!(reason));
            }

            let command = format!(
                "fake-{} {}",
                invocation.job_type,
                render_options(&invocation.options)
            );
            self.fs
                .write(&invocation.paths.command_file, command.as_bytes())?;
            self.fs
                .append(&invocation.paths.log_file, script.log.as_bytes())?;

            if !script.delay.is_zero() {
                tokio::time::sleep(script.delay).await;
            }
            Ok(script.exit_code)
        })
    }
}
