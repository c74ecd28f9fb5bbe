// src/engine/notify.rs

//! Completion notifications.

use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use chrono::Utc;
use tracing::info;

use crate::config::NotifySection;
use crate::fs::FileSystem;
use crate::store::Job;
use crate::types::{JobStatus, display_time};

/// Delivery sink for notifications.
pub trait Notifier: Send + Sync + Debug {
    fn notify(&self, address: &str, subject: &str, body: &str) -> Result<()>;
}

/// Only records notifications in the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, address: &str, subject: &str, body: &str) -> Result<()> {
        info!(to = %address, subject = %subject, bytes = body.len(), "notification");
        Ok(())
    }
}

/// Writes every notification as a text file into a directory.
#[derive(Debug)]
pub struct OutboxNotifier {
    dir: PathBuf,
    fs: Arc<dyn FileSystem>,
    sent: AtomicU64,
}

impl OutboxNotifier {
    pub fn new(dir: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            dir: dir.into(),
            fs,
            sent: AtomicU64::new(0),
        }
    }
}

impl Notifier for OutboxNotifier {
    fn notify(&self, address: &str, subject: &str, body: &str) -> Result<()> {
        let n = self.sent.fetch_add(1, Ordering::SeqCst);
        let name = format!("{}_{n:04}.txt", Utc::now().format("%Y%m%d%H%M%S%3f"));
        let path = self.dir.join(name);
        let message = format!("To: {address}\nSubject: {subject}\n\n{body}");
        self.fs.write(&path, message.as_bytes())?;
        info!(to = %address, path = %path.display(), "notification written to outbox");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

/// Compose the message for a job that just reached a terminal status.
pub fn compose(job: &Job, settings: &NotifySection) -> Notification {
    let subject = match job.title.as_deref().filter(|t| !t.trim().is_empty()) {
        Some(title) => format!("Your job: {title}"),
        None => format!("Your job with ID {} has {}", job.id, job.status),
    };

    let finish = job
        .finish_time
        .as_ref()
        .map(display_time)
        .unwrap_or_else(|| "-".to_string());
    let results_url = format!("{}results/{}", settings.base_url, job.id);

    let mut body = format!(
        "Dear researcher,\n\nThe job (type: {}) you submitted on {} has finished running on {}.\n\n",
        job.job_type,
        display_time(&job.post_time),
        finish
    );

    if job.status == JobStatus::Finished {
        body.push_str(&format!(
            "You are able to perform additional downstream analysis by navigating to the results page of your job by going to:\n{results_url}\n\nAlso, downloading your results is available on this web page.\n"
        ));
    } else {
        body.push_str(&format!(
            "To investigate why your job has failed, please visit {results_url}.\nIf the failure reason is unknown, please submit feedback to help us improve.\n"
        ));
    }

    body.push('\n');
    body.push_str(&settings.footer);

    Notification { subject, body }
}
