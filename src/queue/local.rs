// src/queue/local.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;
use tracing::debug;

use super::core::{Dispatch, QueueCore, QueueStep};
use super::{QueuePayload, WorkQueue};
use crate::errors::{JobchainError, Result};
use crate::types::QueueRef;

/// In-process work queue shared between submitters and workers.
#[derive(Debug, Default)]
pub struct LocalWorkQueue {
    core: Mutex<QueueCore>,
    changed: Notify,
    closed: AtomicBool,
}

impl LocalWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_after(last: QueueRef) -> Self {
        Self {
            core: Mutex::new(QueueCore::starting_after(last)),
            ..Self::default()
        }
    }

    fn core(&self) -> Result<MutexGuard<'_, QueueCore>> {
        self.core
            .lock()
            .map_err(|_| JobchainError::QueueUnavailable("queue lock poisoned".into()))
    }

    fn wake(&self) {
        self.changed.notify_waiters();
    }

    /// Take the next dispatch without waiting.
    pub fn try_next(&self) -> Result<Option<Dispatch>> {
        let mut core = self.core()?;
        let dispatch = core.next_dispatch();
        // Handing out the last cancel leaves nothing in flight.
        if dispatch.is_some() && core.is_idle() {
            self.wake();
        }
        Ok(dispatch)
    }

    /// Wait for the next dispatch. Returns `None` once the queue is closed
    /// and nothing is left to hand out.
    pub async fn next(&self) -> Result<Option<Dispatch>> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(dispatch) = self.try_next()? {
                return Ok(Some(dispatch));
            }
            if self.closed.load(Ordering::SeqCst) {
                return Ok(None);
            }

            notified.await;
        }
    }

    pub fn release(&self, queue_ref: QueueRef) -> Result<bool> {
        let released = self.core()?.release(queue_ref);
        self.wake();
        Ok(released)
    }

    pub fn complete(&self, queue_ref: QueueRef, success: bool) -> Result<QueueStep> {
        let step = self.core()?.complete(queue_ref, success);
        self.wake();
        Ok(step)
    }

    pub fn is_idle(&self) -> Result<bool> {
        Ok(self.core()?.is_idle())
    }

    /// Resolve once nothing is pending or running.
    pub async fn wait_idle(&self) -> Result<()> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_idle()? {
                return Ok(());
            }
            notified.await;
        }
    }

    /// Stop handing out work once the queue drains.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        debug!("work queue closed");
        self.wake();
    }
}

impl WorkQueue for LocalWorkQueue {
    fn enqueue(&self, payload: QueuePayload, depends_on: Option<QueueRef>) -> Result<QueueRef> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(JobchainError::QueueUnavailable("queue is closed".into()));
        }
        let queue_ref = self.core()?.enqueue(payload, depends_on)?;
        self.wake();
        Ok(queue_ref)
    }

    fn cancel(&self, queue_ref: QueueRef) -> Result<bool> {
        let cancelled = self.core()?.cancel(queue_ref);
        self.wake();
        Ok(cancelled)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.core()?.len())
    }

    fn running(&self) -> Result<usize> {
        Ok(self.core()?.running())
    }
}
