// tests/lifecycle_state_machine.rs

use jobchain_test_utils::builders::JobBuilder;
use jobchain_test_utils::init_tracing;

use std::error::Error;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use proptest::prelude::*;

use jobchain::config::NotifySection;
use jobchain::engine::{ExecutionOutcome, JobLifecycle, Notifier};
use jobchain::errors::JobchainError;
use jobchain::fs::{FileSystem, MockFileSystem};
use jobchain::store::{EMAIL_SCRUBBED, JobStore, MemoryJobStore};
use jobchain::types::{JobId, JobStatus, JobType, Statistic};

type TestResult = Result<(), Box<dyn Error>>;

#[derive(Debug, Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, address: &str, subject: &str, _body: &str) -> anyhow::Result<()> {
        if self.fail {
            return Err(anyhow!("mail server down"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((address.to_string(), subject.to_string()));
        Ok(())
    }
}

struct Harness {
    store: Arc<MemoryJobStore>,
    fs: MockFileSystem,
    notifier: Arc<RecordingNotifier>,
    lifecycle: JobLifecycle,
}

fn harness_with(notifier: RecordingNotifier) -> Harness {
    let store = Arc::new(MemoryJobStore::new());
    let fs = MockFileSystem::new();
    let notifier = Arc::new(notifier);
    let lifecycle = JobLifecycle::new(
        store.clone(),
        Arc::new(fs.clone()),
        notifier.clone(),
        "/jobs",
        NotifySection::default(),
    );
    Harness {
        store,
        fs,
        notifier,
        lifecycle,
    }
}

fn harness() -> Harness {
    harness_with(RecordingNotifier::default())
}

fn queued(h: &Harness, id: &str) -> JobId {
    JobBuilder::new(id, JobType::Search)
        .status(JobStatus::Queued)
        .email("someone@example.org")
        .insert(h.store.as_ref())
        .id
}

#[test]
fn transition_table() {
    use JobStatus::*;
    let all = [Waiting, Queued, Running, Finished, Failed];
    let legal = [
        (Waiting, Queued),
        (Waiting, Failed),
        (Queued, Running),
        (Running, Finished),
        (Running, Failed),
    ];
    for from in all {
        for to in all {
            assert_eq!(
                from.can_transition_to(to),
                legal.contains(&(from, to)),
                "{from} -> {to}"
            );
        }
    }
    assert_eq!(JobStatus::initial(true), Waiting);
    assert_eq!(JobStatus::initial(false), Queued);
}

#[test]
fn successful_run_finishes_and_notifies_once() -> TestResult {
    init_tracing();
    let h = harness();
    let id = queued(&h, "A100A100A100A10");

    h.lifecycle.pre_execution(&id)?;
    let running = h.store.fetch(&id)?;
    assert_eq!(running.status, JobStatus::Running);
    assert!(running.start_time.is_some());
    assert!(running.finish_time.is_none());

    let status = h.lifecycle.post_execution(&id, &ExecutionOutcome::Success)?;
    assert_eq!(status, JobStatus::Finished);

    let done = h.store.fetch(&id)?;
    assert!(done.finish_time.is_some());
    assert_eq!(done.email.as_deref(), Some(EMAIL_SCRUBBED));
    assert_eq!(h.store.statistic(Statistic::Finished)?, 1);
    assert_eq!(h.store.statistic(Statistic::Failed)?, 0);

    let sent = h.notifier.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "someone@example.org");
    assert_eq!(sent[0].1, format!("Your job with ID {id} has finished"));
    Ok(())
}

#[test]
fn failed_tool_counts_as_failure() -> TestResult {
    let h = harness();
    let id = queued(&h, "A200A200A200A20");

    h.lifecycle.pre_execution(&id)?;
    let status = h
        .lifecycle
        .post_execution(&id, &ExecutionOutcome::Failed { exit_code: 3 })?;

    assert_eq!(status, JobStatus::Failed);
    assert_eq!(h.store.statistic(Statistic::Failed)?, 1);
    assert_eq!(h.store.statistic(Statistic::Finished)?, 0);
    Ok(())
}

#[test]
fn execution_error_is_written_to_the_job_log() -> TestResult {
    let h = harness();
    let id = queued(&h, "A300A300A300A30");

    h.lifecycle.pre_execution(&id)?;
    h.lifecycle
        .post_execution(&id, &ExecutionOutcome::Error("tool not found".into()))?;

    let log = h.fs.read_to_string(&h.lifecycle.paths(&id).log_file)?;
    assert!(log.contains("ERROR - tool not found"));
    assert_eq!(h.store.fetch(&id)?.status, JobStatus::Failed);
    Ok(())
}

#[test]
fn pre_execution_on_finished_job_changes_nothing() -> TestResult {
    init_tracing();
    let h = harness();
    let job = JobBuilder::new("B100B100B100B10", JobType::Search).insert(h.store.as_ref());

    let err = h.lifecycle.pre_execution(&job.id).unwrap_err();
    assert!(matches!(
        err,
        JobchainError::InvalidTransition {
            from: JobStatus::Finished,
            to: JobStatus::Running,
            ..
        }
    ));
    assert_eq!(h.store.fetch(&job.id)?.status, JobStatus::Finished);
    assert_eq!(h.store.statistic(Statistic::Failed)?, 0);
    assert_eq!(h.store.statistic(Statistic::Finished)?, 0);
    Ok(())
}

#[test]
fn pre_execution_on_waiting_job_forces_failure() -> TestResult {
    let h = harness();
    let job = JobBuilder::new("B200B200B200B20", JobType::Gne)
        .status(JobStatus::Waiting)
        .insert(h.store.as_ref());

    assert!(h.lifecycle.pre_execution(&job.id).is_err());

    let stored = h.store.fetch(&job.id)?;
    assert_eq!(stored.status, JobStatus::Failed);
    assert!(stored.start_time.is_none());
    assert!(stored.finish_time.is_some());
    assert_eq!(h.store.statistic(Statistic::Failed)?, 1);
    Ok(())
}

#[test]
fn post_execution_without_start_forces_failure() -> TestResult {
    let h = harness();
    let id = queued(&h, "B300B300B300B30");

    let status = h.lifecycle.post_execution(&id, &ExecutionOutcome::Success)?;

    assert_eq!(status, JobStatus::Failed);
    assert_eq!(h.store.statistic(Statistic::Failed)?, 1);
    assert_eq!(h.store.statistic(Statistic::Finished)?, 0);
    Ok(())
}

#[test]
fn release_only_applies_to_waiting_jobs() -> TestResult {
    let h = harness();
    let waiting = JobBuilder::new("C100C100C100C10", JobType::Gne)
        .status(JobStatus::Waiting)
        .insert(h.store.as_ref());
    let id = queued(&h, "C200C200C200C20");

    h.lifecycle.release(&waiting.id)?;
    assert_eq!(h.store.fetch(&waiting.id)?.status, JobStatus::Queued);

    assert!(matches!(
        h.lifecycle.release(&id),
        Err(JobchainError::InvalidTransition { .. })
    ));
    assert_eq!(h.store.fetch(&id)?.status, JobStatus::Queued);
    Ok(())
}

#[test]
fn dependent_of_failed_job_is_failed_with_a_log_line() -> TestResult {
    let h = harness();
    let upstream = JobId::new("D100D100D100D10");
    let dependent = JobBuilder::new("D200D200D200D20", JobType::Gne)
        .status(JobStatus::Waiting)
        .depending_on(upstream.as_str())
        .insert(h.store.as_ref());

    h.lifecycle.cancel_dependent(&dependent.id, &upstream)?;

    assert_eq!(h.store.fetch(&dependent.id)?.status, JobStatus::Failed);
    let log = h
        .fs
        .read_to_string(&h.lifecycle.paths(&dependent.id).log_file)?;
    assert!(log.contains(&format!("Preceding job {upstream} failed")));
    assert_eq!(h.store.statistic(Statistic::Failed)?, 1);
    Ok(())
}

#[test]
fn failed_notification_keeps_the_address() -> TestResult {
    let h = harness_with(RecordingNotifier {
        fail: true,
        ..Default::default()
    });
    let id = queued(&h, "E100E100E100E10");

    h.lifecycle.pre_execution(&id)?;
    assert_eq!(
        h.lifecycle.post_execution(&id, &ExecutionOutcome::Success)?,
        JobStatus::Finished
    );
    assert_eq!(
        h.store.fetch(&id)?.email.as_deref(),
        Some("someone@example.org")
    );
    Ok(())
}

#[derive(Debug, Clone)]
enum Op {
    Release,
    Start,
    Succeed,
    Fail,
    CancelDependent,
    Force,
}

fn op_strategy() -> impl Strategy<Value = (usize, Op)> {
    (
        0usize..4,
        prop_oneof![
            Just(Op::Release),
            Just(Op::Start),
            Just(Op::Succeed),
            Just(Op::Fail),
            Just(Op::CancelDependent),
            Just(Op::Force),
        ],
    )
}

proptest! {
    /// However hooks are (mis)ordered, each terminal job is counted and
    /// notified exactly once.
    #[test]
    fn counters_match_terminal_rows(ops in proptest::collection::vec(op_strategy(), 0..40)) {
        let h = harness();
        let ids: Vec<JobId> = ["F100F100F100F10", "F200F200F200F20", "F300F300F300F30", "F400F400F400F40"]
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let status = if i % 2 == 0 { JobStatus::Queued } else { JobStatus::Waiting };
                JobBuilder::new(id, JobType::Gne)
                    .status(status)
                    .email("someone@example.org")
                    .insert(h.store.as_ref())
                    .id
            })
            .collect();

        for (index, op) in ops {
            let id = &ids[index];
            let _ = match op {
                Op::Release => h.lifecycle.release(id).map(|_| ()),
                Op::Start => h.lifecycle.pre_execution(id).map(|_| ()),
                Op::Succeed => h.lifecycle.post_execution(id, &ExecutionOutcome::Success).map(|_| ()),
                Op::Fail => h
                    .lifecycle
                    .post_execution(id, &ExecutionOutcome::Failed { exit_code: 1 })
                    .map(|_| ()),
                Op::CancelDependent => h.lifecycle.cancel_dependent(id, &ids[0]).map(|_| ()),
                Op::Force => h.lifecycle.force_failed(id, "forced").map(|_| ()),
            };
        }

        let mut finished = 0;
        let mut failed = 0;
        for id in &ids {
            let job = h.store.fetch(id).unwrap();
            match job.status {
                JobStatus::Finished => finished += 1,
                JobStatus::Failed => failed += 1,
                _ => {}
            }
            if job.status.is_terminal() {
                prop_assert!(job.finish_time.is_some());
                prop_assert_eq!(job.email.as_deref(), Some(EMAIL_SCRUBBED));
            }
        }

        prop_assert_eq!(h.store.statistic(Statistic::Finished).unwrap(), finished);
        prop_assert_eq!(h.store.statistic(Statistic::Failed).unwrap(), failed);
        prop_assert_eq!(h.notifier.sent.lock().unwrap().len() as u64, finished + failed);
    }
}
