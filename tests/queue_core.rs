// tests/queue_core.rs

use jobchain_test_utils::{init_tracing, with_timeout};

use std::error::Error;
use std::sync::Arc;

use jobchain::errors::JobchainError;
use jobchain::queue::{Dispatch, EntryState, LocalWorkQueue, QueueCore, QueuePayload, WorkQueue};
use jobchain::types::{JobId, JobOptions, JobType, QueueRef};

type TestResult = Result<(), Box<dyn Error>>;

fn payload(id: &str) -> QueuePayload {
    QueuePayload {
        job: JobId::new(id),
        job_type: JobType::Search,
        options: JobOptions::new(),
        input: None,
        basis_results: None,
    }
}

fn run_ref(dispatch: Option<Dispatch>) -> QueueRef {
    match dispatch {
        Some(Dispatch::Run(entry)) => entry.queue_ref,
        other => panic!("expected run dispatch, got {other:?}"),
    }
}

#[test]
fn independent_entries_run_in_submission_order() -> TestResult {
    let mut core = QueueCore::new();
    let a = core.enqueue(payload("A"), None)?;
    let b = core.enqueue(payload("B"), None)?;

    assert_eq!(core.len(), 2);
    assert_eq!(run_ref(core.next_dispatch()), a);
    assert_eq!(run_ref(core.next_dispatch()), b);
    assert!(core.next_dispatch().is_none());
    assert_eq!(core.running(), 2);
    assert!(core.is_empty());
    assert!(!core.is_idle());
    Ok(())
}

#[test]
fn dependent_is_released_only_after_success() -> TestResult {
    let mut core = QueueCore::new();
    let a = core.enqueue(payload("A"), None)?;
    let b = core.enqueue(payload("B"), Some(a))?;

    assert_eq!(core.state(b), Some(EntryState::Deferred));
    assert_eq!(run_ref(core.next_dispatch()), a);
    assert!(core.next_dispatch().is_none());

    let step = core.complete(a, true);
    assert_eq!(step.unblocked, vec![b]);
    assert_eq!(core.state(b), Some(EntryState::Held));

    match core.next_dispatch() {
        Some(Dispatch::Release(entry)) => assert_eq!(entry.queue_ref, b),
        other => panic!("expected release, got {other:?}"),
    }
    // Held entries are never run before they are released.
    assert!(core.next_dispatch().is_none());

    assert!(core.release(b));
    assert!(!core.release(b));
    assert_eq!(run_ref(core.next_dispatch()), b);
    core.complete(b, true);
    assert!(core.is_idle());
    Ok(())
}

#[test]
fn failure_cancels_the_chain_transitively() -> TestResult {
    init_tracing();
    let mut core = QueueCore::new();
    let a = core.enqueue(payload("A"), None)?;
    let b = core.enqueue(payload("B"), Some(a))?;
    let c = core.enqueue(payload("C"), Some(b))?;
    let other = core.enqueue(payload("X"), None)?;

    assert_eq!(run_ref(core.next_dispatch()), a);
    let step = core.complete(a, false);
    assert_eq!(step.cancelled.len(), 2);
    assert_eq!(core.state(b), Some(EntryState::Cancelled));
    assert_eq!(core.state(c), Some(EntryState::Cancelled));

    let mut cancelled = Vec::new();
    for _ in 0..2 {
        match core.next_dispatch() {
            Some(Dispatch::Cancel { entry, upstream }) => {
                assert_eq!(upstream, JobId::new("A"));
                cancelled.push(entry.queue_ref);
            }
            other => panic!("expected cancel, got {other:?}"),
        }
    }
    cancelled.sort();
    assert_eq!(cancelled, vec![b, c]);

    assert_eq!(run_ref(core.next_dispatch()), other);
    Ok(())
}

#[test]
fn explicit_cancel_is_silent_and_cascades() -> TestResult {
    let mut core = QueueCore::new();
    let a = core.enqueue(payload("A"), None)?;
    let b = core.enqueue(payload("B"), Some(a))?;

    assert!(core.cancel(a));
    assert!(!core.cancel(a));
    assert_eq!(core.state(b), Some(EntryState::Cancelled));
    assert!(core.next_dispatch().is_none());
    assert!(core.is_idle());
    Ok(())
}

#[test]
fn started_entries_cannot_be_cancelled() -> TestResult {
    let mut core = QueueCore::new();
    let a = core.enqueue(payload("A"), None)?;
    run_ref(core.next_dispatch());
    assert!(!core.cancel(a));
    assert_eq!(core.state(a), Some(EntryState::Started));
    Ok(())
}

#[test]
fn enqueue_after_finished_or_failed_upstream() -> TestResult {
    let mut core = QueueCore::new();
    let ok = core.enqueue(payload("OK"), None)?;
    let bad = core.enqueue(payload("BAD"), None)?;
    run_ref(core.next_dispatch());
    run_ref(core.next_dispatch());
    core.complete(ok, true);
    core.complete(bad, false);

    let late_ok = core.enqueue(payload("L1"), Some(ok))?;
    let late_bad = core.enqueue(payload("L2"), Some(bad))?;
    assert_eq!(core.state(late_ok), Some(EntryState::Held));
    assert_eq!(core.state(late_bad), Some(EntryState::Cancelled));

    assert!(matches!(core.next_dispatch(), Some(Dispatch::Release(_))));
    match core.next_dispatch() {
        Some(Dispatch::Cancel { upstream, .. }) => assert_eq!(upstream, JobId::new("BAD")),
        other => panic!("expected cancel, got {other:?}"),
    }
    Ok(())
}

#[test]
fn unknown_dependency_is_an_error() {
    let mut core = QueueCore::new();
    assert!(matches!(
        core.enqueue(payload("A"), Some(QueueRef(42))),
        Err(JobchainError::QueueUnavailable(_))
    ));
    assert!(core.is_empty());
}

#[tokio::test]
async fn local_queue_hands_out_work_and_closes() -> TestResult {
    init_tracing();
    let queue = Arc::new(LocalWorkQueue::new());

    let waiter = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.next().await })
    };
    let a = queue.enqueue(payload("A"), None)?;

    let dispatch = with_timeout(waiter).await??;
    assert!(matches!(dispatch, Some(Dispatch::Run(ref e)) if e.queue_ref == a));
    assert_eq!(queue.running()?, 1);

    let idle = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.wait_idle().await })
    };
    queue.complete(a, true)?;
    with_timeout(idle).await??;

    queue.close();
    assert!(with_timeout(queue.next()).await?.is_none());
    assert!(queue.enqueue(payload("B"), None).is_err());
    Ok(())
}

#[tokio::test]
async fn handing_out_the_last_cancel_wakes_idle_waiters() -> TestResult {
    let queue = Arc::new(LocalWorkQueue::new());
    let a = queue.enqueue(payload("A"), None)?;
    queue.enqueue(payload("B"), Some(a))?;

    assert!(matches!(queue.next().await?, Some(Dispatch::Run(_))));
    queue.complete(a, false)?;

    let idle = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.wait_idle().await })
    };
    tokio::task::yield_now().await;

    assert!(matches!(queue.next().await?, Some(Dispatch::Cancel { .. })));
    with_timeout(idle).await??;
    Ok(())
}
