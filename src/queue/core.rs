// src/queue/core.rs

//! Pure work-queue state machine.
//!
//! No IO and no async here: [`QueueCore`] only tracks entries, their
//! dependencies and what a worker should do next. [`super::LocalWorkQueue`]
//! wraps it with a lock and wake-ups.
//!
//! Entry lifecycle:
//!
//! ```text
//! Deferred --predecessor succeeded--> Held --release--> Ready --> Started
//!     |                                                              |
//!     +--predecessor failed/cancelled--> Cancelled       Succeeded / Failed
//! ```
//!
//! `Held` exists so the job row can move `waiting -> queued` before any worker
//! is allowed to pick the entry up.

use std::collections::{HashMap, VecDeque};

use petgraph::Direction;
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, info, warn};

use crate::errors::{JobchainError, Result};
use crate::queue::QueuePayload;
use crate::types::{JobId, QueueRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Deferred,
    Held,
    Ready,
    Started,
    Succeeded,
    Failed,
    Cancelled,
}

impl EntryState {
    pub fn is_pending(self) -> bool {
        matches!(self, EntryState::Deferred | EntryState::Held | EntryState::Ready)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EntryState::Succeeded | EntryState::Failed | EntryState::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub queue_ref: QueueRef,
    pub payload: QueuePayload,
}

/// Next piece of work handed to a worker.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Run the tool for this entry. The entry is now `Started`.
    Run(QueueEntry),
    /// Predecessor succeeded: move the job to `queued`, then call
    /// [`QueueCore::release`].
    Release(QueueEntry),
    /// Predecessor `upstream` failed; the entry was cancelled and the job
    /// should be failed.
    Cancel { entry: QueueEntry, upstream: JobId },
}

/// Effects of completing an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStep {
    /// Entries moved to `Held`.
    pub unblocked: Vec<QueueRef>,
    /// Entries cancelled because of a failure upstream.
    pub cancelled: Vec<QueueRef>,
}

#[derive(Debug)]
struct Slot {
    payload: QueuePayload,
    state: EntryState,
}

#[derive(Debug, Default)]
pub struct QueueCore {
    next_ref: u64,
    slots: HashMap<QueueRef, Slot>,
    /// Edge `a -> b` means `b` waits for `a`.
    dependents: DiGraphMap<QueueRef, ()>,
    ready: VecDeque<QueueRef>,
    actions: VecDeque<Dispatch>,
}

impl QueueCore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty queue whose references continue after `last`, so refs stored on
    /// rows by an earlier process are never handed out again.
    pub fn starting_after(last: QueueRef) -> Self {
        Self {
            next_ref: last.0,
            ..Self::default()
        }
    }

    pub fn state(&self, queue_ref: QueueRef) -> Option<EntryState> {
        self.slots.get(&queue_ref).map(|s| s.state)
    }

    /// Entries not yet started (deferred, held or ready).
    pub fn len(&self) -> usize {
        self.slots.values().filter(|s| s.state.is_pending()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn running(&self) -> usize {
        self.slots
            .values()
            .filter(|s| s.state == EntryState::Started)
            .count()
    }

    /// Nothing pending, nothing running and no undelivered dispatches.
    pub fn is_idle(&self) -> bool {
        self.actions.is_empty() && self.slots.values().all(|s| s.state.is_terminal())
    }

    pub fn enqueue(
        &mut self,
        payload: QueuePayload,
        depends_on: Option<QueueRef>,
    ) -> Result<QueueRef> {
        let upstream_state = match depends_on {
            Some(dep) => Some(self.state(dep).ok_or_else(|| {
                JobchainError::QueueUnavailable(format!("unknown queue dependency {dep}"))
            })?),
            None => None,
        };

        self.next_ref += 1;
        let queue_ref = QueueRef(self.next_ref);
        self.dependents.add_node(queue_ref);

        let state = match (depends_on, upstream_state) {
            (Some(dep), Some(up)) => {
                self.dependents.add_edge(dep, queue_ref, ());
                match up {
                    EntryState::Succeeded => EntryState::Held,
                    EntryState::Failed | EntryState::Cancelled => EntryState::Cancelled,
                    _ => EntryState::Deferred,
                }
            }
            _ => EntryState::Ready,
        };

        let entry = QueueEntry {
            queue_ref,
            payload: payload.clone(),
        };
        match state {
            EntryState::Ready => self.ready.push_back(queue_ref),
            EntryState::Held => self.actions.push_back(Dispatch::Release(entry)),
            EntryState::Cancelled => {
                let upstream = depends_on
                    .and_then(|dep| self.slots.get(&dep))
                    .map(|s| s.payload.job.clone())
                    .unwrap_or_else(|| payload.job.clone());
                self.actions.push_back(Dispatch::Cancel { entry, upstream });
            }
            _ => {}
        }

        debug!(queue_ref = %queue_ref, job = %payload.job, ?state, "enqueued entry");
        self.slots.insert(queue_ref, Slot { payload, state });
        Ok(queue_ref)
    }

    /// Take the next dispatch. Release/cancel dispatches come first, then the
    /// oldest ready entry, which moves to `Started`.
    pub fn next_dispatch(&mut self) -> Option<Dispatch> {
        if let Some(action) = self.actions.pop_front() {
            return Some(action);
        }

        while let Some(queue_ref) = self.ready.pop_front() {
            if let Some(slot) = self.slots.get_mut(&queue_ref) {
                if slot.state == EntryState::Ready {
                    slot.state = EntryState::Started;
                    return Some(Dispatch::Run(QueueEntry {
                        queue_ref,
                        payload: slot.payload.clone(),
                    }));
                }
            }
        }
        None
    }

    /// Make a held entry runnable. Returns false if it was not held.
    pub fn release(&mut self, queue_ref: QueueRef) -> bool {
        match self.slots.get_mut(&queue_ref) {
            Some(slot) if slot.state == EntryState::Held => {
                slot.state = EntryState::Ready;
                self.ready.push_back(queue_ref);
                true
            }
            _ => false,
        }
    }

    /// Record the outcome of a started entry.
    pub fn complete(&mut self, queue_ref: QueueRef, success: bool) -> QueueStep {
        let mut step = QueueStep::default();

        let job = match self.slots.get_mut(&queue_ref) {
            Some(slot) if slot.state == EntryState::Started => {
                slot.state = if success {
                    EntryState::Succeeded
                } else {
                    EntryState::Failed
                };
                slot.payload.job.clone()
            }
            Some(slot) => {
                warn!(queue_ref = %queue_ref, state = ?slot.state, "completion for entry that was not started");
                return step;
            }
            None => {
                warn!(queue_ref = %queue_ref, "completion for unknown entry");
                return step;
            }
        };

        if success {
            let direct: Vec<QueueRef> = self
                .dependents
                .neighbors_directed(queue_ref, Direction::Outgoing)
                .collect();
            for dep in direct {
                if let Some(slot) = self.slots.get_mut(&dep) {
                    if slot.state == EntryState::Deferred {
                        slot.state = EntryState::Held;
                        self.actions.push_back(Dispatch::Release(QueueEntry {
                            queue_ref: dep,
                            payload: slot.payload.clone(),
                        }));
                        step.unblocked.push(dep);
                    }
                }
            }
        } else {
            step.cancelled = self.cancel_dependents(queue_ref, &job, true);
            if !step.cancelled.is_empty() {
                info!(queue_ref = %queue_ref, job = %job, cancelled = step.cancelled.len(), "cancelled dependents of failed entry");
            }
        }

        step
    }

    /// Cancel a pending entry and everything waiting on it, without emitting
    /// dispatches. Returns false if the entry had already started or ended.
    pub fn cancel(&mut self, queue_ref: QueueRef) -> bool {
        let job = match self.slots.get_mut(&queue_ref) {
            Some(slot) if slot.state.is_pending() => {
                slot.state = EntryState::Cancelled;
                slot.payload.job.clone()
            }
            _ => return false,
        };
        self.ready.retain(|r| *r != queue_ref);
        self.actions.retain(|a| dispatch_ref(a) != queue_ref);
        self.cancel_dependents(queue_ref, &job, false);
        debug!(queue_ref = %queue_ref, job = %job, "cancelled entry");
        true
    }

    /// Mark every pending transitive dependent of `origin` cancelled.
    fn cancel_dependents(&mut self, origin: QueueRef, origin_job: &JobId, notify: bool) -> Vec<QueueRef> {
        let mut stack: Vec<QueueRef> = self
            .dependents
            .neighbors_directed(origin, Direction::Outgoing)
            .collect();
        let mut cancelled = Vec::new();

        while let Some(queue_ref) = stack.pop() {
            let Some(slot) = self.slots.get_mut(&queue_ref) else {
                continue;
            };
            if !slot.state.is_pending() {
                continue;
            }
            slot.state = EntryState::Cancelled;
            let entry = QueueEntry {
                queue_ref,
                payload: slot.payload.clone(),
            };
            self.ready.retain(|r| *r != queue_ref);
            self.actions.retain(|a| dispatch_ref(a) != queue_ref);
            if notify {
                self.actions.push_back(Dispatch::Cancel {
                    entry,
                    upstream: origin_job.clone(),
                });
            }
            cancelled.push(queue_ref);
            stack.extend(
                self.dependents
                    .neighbors_directed(queue_ref, Direction::Outgoing),
            );
        }

        cancelled
    }
}

fn dispatch_ref(dispatch: &Dispatch) -> QueueRef {
    match dispatch {
        Dispatch::Run(entry) | Dispatch::Release(entry) => entry.queue_ref,
        Dispatch::Cancel { entry, .. } => entry.queue_ref,
    }
}
