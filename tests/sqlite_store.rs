// tests/sqlite_store.rs

use jobchain_test_utils::builders::JobBuilder;
use jobchain_test_utils::init_tracing;

use std::error::Error;
use std::sync::Arc;
use std::thread;

use chrono::{TimeZone, Utc};
use tempfile::tempdir;

use jobchain::errors::JobchainError;
use jobchain::store::{EMAIL_SCRUBBED, JobStore, SqliteJobStore};
use jobchain::types::{JobId, JobStatus, JobType, QueueRef, Statistic};

type TestResult = Result<(), Box<dyn Error>>;

const ROOT: &str = "S100S100S100S10";
const CHILD: &str = "S200S200S200S20";

#[test]
fn rows_survive_reopening() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let path = dir.path().join("db").join("jobchain.sqlite");
    let posted = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();

    {
        let store = SqliteJobStore::open(&path)?;
        JobBuilder::new(ROOT, JobType::Search)
            .status(JobStatus::Queued)
            .title("root search")
            .email("someone@example.org")
            .posted(posted)
            .insert(&store);
        JobBuilder::new(CHILD, JobType::Gne)
            .status(JobStatus::Waiting)
            .root(ROOT)
            .depending_on(ROOT)
            .insert(&store);
        store.set_queue_ref(&JobId::new(ROOT), QueueRef(7))?;
    }

    let store = SqliteJobStore::open(&path)?;
    let root = store.fetch(&JobId::new(ROOT))?;
    assert_eq!(root.job_type, JobType::Search);
    assert_eq!(root.status, JobStatus::Queued);
    assert_eq!(root.title.as_deref(), Some("root search"));
    assert_eq!(root.queue_ref, Some(QueueRef(7)));
    assert_eq!(root.post_time, posted);
    assert_eq!(root.child_jobs, vec![JobId::new(CHILD)]);

    let child = store.fetch(&JobId::new(CHILD))?;
    assert_eq!(child.main_search_job, Some(JobId::new(ROOT)));
    assert_eq!(child.depending_on, Some(JobId::new(ROOT)));
    assert!(child.child_jobs.is_empty());
    assert_eq!(store.job_ids()?, vec![JobId::new(ROOT), JobId::new(CHILD)]);
    Ok(())
}

#[test]
fn transition_is_compare_and_swap() -> TestResult {
    let store = SqliteJobStore::open_in_memory()?;
    let id = JobBuilder::new(ROOT, JobType::Search)
        .status(JobStatus::Queued)
        .insert(&store)
        .id;
    let at = Utc::now();

    store.transition(&id, JobStatus::Queued, JobStatus::Running, at)?;
    match store.transition(&id, JobStatus::Queued, JobStatus::Running, at) {
        Err(JobchainError::InvalidTransition { from, .. }) => assert_eq!(from, JobStatus::Running),
        other => panic!("expected InvalidTransition, got {other:?}"),
    }

    store.transition(&id, JobStatus::Running, JobStatus::Finished, at)?;
    let job = store.fetch(&id)?;
    assert_eq!(job.status, JobStatus::Finished);
    assert_eq!(job.start_time, Some(at));
    assert_eq!(job.finish_time, Some(at));

    assert!(matches!(
        store.transition(&JobId::new(CHILD), JobStatus::Queued, JobStatus::Running, at),
        Err(JobchainError::JobNotFound(_))
    ));
    Ok(())
}

#[test]
fn deleted_id_stays_issued() -> TestResult {
    let store = SqliteJobStore::open_in_memory()?;
    let job = JobBuilder::new(ROOT, JobType::Search).insert(&store);

    assert!(store.delete(&job.id)?);
    assert!(!store.delete(&job.id)?);
    assert!(store.id_issued(&job.id)?);
    assert!(matches!(store.insert(&job), Err(JobchainError::IdConflict(_))));
    Ok(())
}

#[test]
fn email_scrub_and_children() -> TestResult {
    let store = SqliteJobStore::open_in_memory()?;
    let root = JobBuilder::new(ROOT, JobType::Search)
        .email("someone@example.org")
        .insert(&store);

    store.scrub_email(&root.id)?;
    assert_eq!(store.fetch(&root.id)?.email.as_deref(), Some(EMAIL_SCRUBBED));

    let first = JobBuilder::new(CHILD, JobType::Gne).root(ROOT).insert(&store);
    let second = JobBuilder::new("S300S300S300S30", JobType::Recompute)
        .root(ROOT)
        .insert(&store);
    assert_eq!(
        store.fetch(&root.id)?.child_jobs,
        vec![first.id.clone(), second.id.clone()]
    );

    assert!(store.delete(&first.id)?);
    assert_eq!(store.fetch(&root.id)?.child_jobs, vec![second.id]);

    // A row whose root is gone is stored without a link.
    let orphan = JobBuilder::new("S400S400S400S40", JobType::Gne)
        .root("Z999Z999Z999Z99")
        .insert(&store);
    assert!(store.get(&orphan.id)?.is_some());
    Ok(())
}

#[test]
fn terminal_transitions_count_once() -> TestResult {
    let store = SqliteJobStore::open_in_memory()?;
    let id = JobBuilder::new(ROOT, JobType::Search)
        .status(JobStatus::Running)
        .insert(&store)
        .id;
    let at = Utc::now();

    store.transition(&id, JobStatus::Running, JobStatus::Finished, at)?;
    assert_eq!(store.statistic(Statistic::Finished)?, 1);

    assert!(
        store
            .transition(&id, JobStatus::Running, JobStatus::Failed, at)
            .is_err()
    );
    assert_eq!(store.statistic(Statistic::Finished)?, 1);
    assert_eq!(store.statistic(Statistic::Failed)?, 0);

    let waiting = JobBuilder::new(CHILD, JobType::Gne)
        .status(JobStatus::Waiting)
        .insert(&store)
        .id;
    store.transition(&waiting, JobStatus::Waiting, JobStatus::Queued, at)?;
    assert_eq!(store.statistic(Statistic::Failed)?, 0);
    Ok(())
}

#[test]
fn concurrent_transitions_are_counted_exactly() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let store = Arc::new(SqliteJobStore::open(dir.path().join("stats.sqlite"))?);

    let ids: Vec<JobId> = (0..100)
        .map(|n| {
            JobBuilder::new(&format!("J{n:014}"), JobType::Search)
                .status(JobStatus::Running)
                .insert(store.as_ref())
                .id
        })
        .collect();

    // Every row is raced by two threads; only one of them may win.
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            let ids: Vec<JobId> = ids.iter().skip((t % 2) * 50).take(50).cloned().collect();
            thread::spawn(move || {
                let mut won = 0;
                for id in &ids {
                    match store.transition(id, JobStatus::Running, JobStatus::Finished, Utc::now()) {
                        Ok(()) => won += 1,
                        Err(JobchainError::InvalidTransition { .. }) => {}
                        Err(e) => return Err(e),
                    }
                }
                Ok::<_, JobchainError>(won)
            })
        })
        .collect();

    let mut won = 0;
    for handle in handles {
        won += handle.join().map_err(|_| "transition thread panicked")??;
    }

    assert_eq!(won, 100);
    assert_eq!(store.statistic(Statistic::Finished)?, 100);
    assert_eq!(store.statistic(Statistic::Failed)?, 0);
    Ok(())
}

#[test]
fn unfinished_rows_and_last_queue_ref() -> TestResult {
    let store = SqliteJobStore::open_in_memory()?;
    assert_eq!(store.last_queue_ref()?, None);

    let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let later = Utc.with_ymd_and_hms(2024, 3, 1, 13, 0, 0).unwrap();
    JobBuilder::new(CHILD, JobType::Gne)
        .status(JobStatus::Waiting)
        .queue_ref(QueueRef(4))
        .posted(later)
        .insert(&store);
    JobBuilder::new(ROOT, JobType::Search)
        .status(JobStatus::Queued)
        .queue_ref(QueueRef(3))
        .posted(t0)
        .insert(&store);
    JobBuilder::new("S300S300S300S30", JobType::Search)
        .queue_ref(QueueRef(9))
        .insert(&store);

    let unfinished: Vec<JobId> = store.unfinished_jobs()?.into_iter().map(|j| j.id).collect();
    assert_eq!(unfinished, vec![JobId::new(ROOT), JobId::new(CHILD)]);
    assert_eq!(store.last_queue_ref()?, Some(QueueRef(9)));
    Ok(())
}
