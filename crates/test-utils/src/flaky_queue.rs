use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use jobchain::errors::{JobchainError, Result};
use jobchain::queue::{LocalWorkQueue, QueuePayload, WorkQueue};
use jobchain::types::QueueRef;

/// Work queue that accepts `accept` entries and then reports itself
/// unavailable.
#[derive(Debug)]
pub struct FlakyQueue {
    inner: Arc<LocalWorkQueue>,
    accept: usize,
    enqueued: AtomicUsize,
    start_accepted: bool,
}

impl FlakyQueue {
    pub fn new(inner: Arc<LocalWorkQueue>, accept: usize) -> Self {
        Self {
            inner,
            accept,
            enqueued: AtomicUsize::new(0),
            start_accepted: false,
        }
    }

    /// Hand every accepted entry to a worker right away, as a busy pool
    /// would, so it can no longer be withdrawn.
    pub fn start_accepted(mut self) -> Self {
        self.start_accepted = true;
        self
    }
}

impl WorkQueue for FlakyQueue {
    fn enqueue(&self, payload: QueuePayload, depends_on: Option<QueueRef>) -> Result<QueueRef> {
        if self.enqueued.fetch_add(1, Ordering::SeqCst) >= self.accept {
            return Err(JobchainError::QueueUnavailable("broker offline".into()));
        }
        let queue_ref = self.inner.enqueue(payload, depends_on)?;
        if self.start_accepted {
            self.inner.try_next()?;
        }
        Ok(queue_ref)
    }

    fn cancel(&self, queue_ref: QueueRef) -> Result<bool> {
        self.inner.cancel(queue_ref)
    }

    fn len(&self) -> Result<usize> {
        self.inner.len()
    }

    fn running(&self) -> Result<usize> {
        self.inner.running()
    }
}
