// tests/worker_pool.rs

use jobchain_test_utils::builders::{ConfigFileBuilder, JobBuilder};
use jobchain_test_utils::fake_invoker::{Script, ScriptedInvoker};
use jobchain_test_utils::{init_tracing, with_timeout};

use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use jobchain::app::Services;
use jobchain::config::ConfigFile;
use jobchain::engine::OutboxNotifier;
use jobchain::exec::ToolInvoker;
use jobchain::failure::failure_reason;
use jobchain::fs::{FileSystem, MockFileSystem};
use jobchain::lineage::{PendingJobRequest, plan_visualization};
use jobchain::store::{EMAIL_SCRUBBED, JobStore, MemoryJobStore};
use jobchain::types::{JobOptions, JobStatus, JobType, Statistic};

type TestResult = Result<(), Box<dyn Error>>;

fn services(config: ConfigFile, fs: &MockFileSystem) -> Services {
    let fs: Arc<dyn FileSystem> = Arc::new(fs.clone());
    let notifier = Arc::new(OutboxNotifier::new("/outbox", Arc::clone(&fs)));
    Services::new(config, Arc::new(MemoryJobStore::new()), fs, notifier).expect("services")
}

fn default_config() -> ConfigFile {
    ConfigFileBuilder::new().jobs_dir("/jobs").workers(2).build()
}

#[tokio::test]
async fn chain_runs_in_order_and_notifies() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    let services = services(default_config(), &fs);
    let invoker = Arc::new(ScriptedInvoker::new(services.fs.clone()));

    let ids = services.orchestrator.submit_batch(&[
        PendingJobRequest::new(JobType::Search).with_email("someone@example.org"),
        PendingJobRequest::new(JobType::Gne)
            .after(0)
            .with_option("sample_number", 25),
    ])?;

    let dyn_invoker: Arc<dyn ToolInvoker> = invoker.clone();
    with_timeout(services.worker_pool(dyn_invoker).run_until_idle()).await?;

    for id in &ids {
        let job = services.store.fetch(id)?;
        assert_eq!(job.status, JobStatus::Finished, "job {id}");
        assert!(job.start_time.is_some() && job.finish_time.is_some());
    }
    let search = services.store.fetch(&ids[0])?;
    let gne = services.store.fetch(&ids[1])?;
    assert!(gne.start_time >= search.finish_time);

    let invoked: Vec<_> = invoker.invoked().into_iter().map(|(id, _)| id).collect();
    assert_eq!(invoked, ids);
    assert_eq!(services.store.statistic(Statistic::Finished)?, 2);

    let gne_paths = services.lifecycle.paths(&ids[1]);
    assert!(fs.read_to_string(&gne_paths.command_file)?.contains("--sample_number 25"));
    let manifest = fs.read_to_string(&gne_paths.manifest)?;
    assert!(manifest.contains(&format!("logs/{}.log", ids[1])));

    let outbox = fs.read_dir(Path::new("/outbox"))?;
    assert_eq!(outbox.len(), 1);
    let message = fs.read_to_string(&outbox[0])?;
    assert!(message.starts_with("To: someone@example.org\n"));
    assert!(message.contains(&format!("results/{}", ids[0])));
    assert_eq!(search.email.as_deref(), Some(EMAIL_SCRUBBED));
    Ok(())
}

#[tokio::test]
async fn failed_predecessor_fails_the_rest_of_the_chain() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    let services = services(default_config(), &fs);
    let invoker = Arc::new(ScriptedInvoker::new(services.fs.clone()).script(
        JobType::Search,
        Script::exit(1, "ValueError: Search completed, but found no hits\n"),
    ));

    let ids = services.orchestrator.submit_batch(&[
        PendingJobRequest::new(JobType::Search),
        PendingJobRequest::new(JobType::Gne).after(0),
        PendingJobRequest::new(JobType::ExtractSequences).after(1),
    ])?;

    let dyn_invoker: Arc<dyn ToolInvoker> = invoker.clone();
    with_timeout(services.worker_pool(dyn_invoker).run_until_idle()).await?;

    for id in &ids {
        assert_eq!(services.store.fetch(id)?.status, JobStatus::Failed, "job {id}");
    }
    assert_eq!(invoker.invoked().len(), 1);
    assert_eq!(services.store.statistic(Statistic::Failed)?, 3);
    assert_eq!(services.store.statistic(Statistic::Finished)?, 0);

    for id in &ids[1..] {
        let log = fs.read_to_string(&services.lifecycle.paths(id).log_file)?;
        assert!(log.contains(&format!("Preceding job {} failed", ids[0])));
        assert!(services.store.fetch(id)?.start_time.is_none());
    }

    let reason = failure_reason(
        &fs,
        &services.lifecycle.paths(&ids[0]),
        &services.config.failure_reasons,
    );
    assert!(reason.starts_with("Your search with the specified parameters did not return any hits"));
    Ok(())
}

#[tokio::test]
async fn threshold_violation_skips_the_tool() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    let config = ConfigFileBuilder::new()
        .jobs_dir("/jobs")
        .max_gne_samples(10)
        .build();
    let services = services(config, &fs);
    let invoker = Arc::new(ScriptedInvoker::new(services.fs.clone()));

    let ids = services.orchestrator.submit_batch(&[
        PendingJobRequest::new(JobType::Search),
        PendingJobRequest::new(JobType::Gne)
            .after(0)
            .with_option("sample_number", 25),
    ])?;

    let dyn_invoker: Arc<dyn ToolInvoker> = invoker.clone();
    with_timeout(services.worker_pool(dyn_invoker).run_until_idle()).await?;

    assert_eq!(services.store.fetch(&ids[0])?.status, JobStatus::Finished);
    assert_eq!(services.store.fetch(&ids[1])?.status, JobStatus::Failed);
    assert_eq!(invoker.invoked().len(), 1);

    let paths = services.lifecycle.paths(&ids[1]);
    assert!(fs.read_to_string(&paths.log_file)?.contains("Too many samples (25 > 10)"));
    assert!(
        failure_reason(&fs, &paths, &services.config.failure_reasons)
            .starts_with("You set the value for the number of samples parameter too high")
    );
    Ok(())
}

#[tokio::test]
async fn hung_tool_is_stopped_by_the_job_timeout() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    let config = ConfigFileBuilder::new()
        .jobs_dir("/jobs")
        .job_timeout("100ms")
        .build();
    let services = services(config, &fs);
    let invoker: Arc<dyn ToolInvoker> = Arc::new(
        ScriptedInvoker::new(services.fs.clone())
            .script(JobType::Search, Script::hang(Duration::from_secs(60))),
    );

    let id = services
        .orchestrator
        .submit(&[PendingJobRequest::new(JobType::Search)])?;
    with_timeout(services.worker_pool(invoker).run_until_idle()).await?;

    assert_eq!(services.store.fetch(&id)?.status, JobStatus::Failed);
    let log = fs.read_to_string(&services.lifecycle.paths(&id).log_file)?;
    assert!(log.contains("exceeded the execution timeout"));
    Ok(())
}

#[tokio::test]
async fn invoker_error_fails_the_job() -> TestResult {
    let fs = MockFileSystem::new();
    let services = services(default_config(), &fs);
    let invoker: Arc<dyn ToolInvoker> = Arc::new(
        ScriptedInvoker::new(services.fs.clone()).script(
            JobType::Clinker,
            Script {
                error: Some("clinker is not installed".into()),
                ..Script::success("")
            },
        ),
    );

    let id = services
        .orchestrator
        .submit(&[PendingJobRequest::new(JobType::Clinker)])?;
    with_timeout(services.worker_pool(invoker).run_until_idle()).await?;

    assert_eq!(services.store.fetch(&id)?.status, JobStatus::Failed);
    let log = fs.read_to_string(&services.lifecycle.paths(&id).log_file)?;
    assert!(log.contains("ERROR - clinker is not installed"));
    Ok(())
}

#[tokio::test]
async fn many_independent_jobs_all_complete() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    let config = ConfigFileBuilder::new().jobs_dir("/jobs").workers(3).build();
    let services = services(config, &fs);
    let invoker: Arc<dyn ToolInvoker> = Arc::new(
        ScriptedInvoker::new(services.fs.clone()).script(
            JobType::Search,
            Script {
                delay: Duration::from_millis(10),
                ..Script::success("INFO - Done.\n")
            },
        ),
    );

    for _ in 0..10 {
        services
            .orchestrator
            .submit(&[PendingJobRequest::new(JobType::Search)])?;
    }
    with_timeout(services.worker_pool(invoker).run_until_idle()).await?;

    let info = services.orchestrator.server_info()?;
    assert_eq!(info.completed, 10);
    assert_eq!(info.queued, 0);
    assert_eq!(info.running, 0);
    Ok(())
}

#[tokio::test]
async fn visualization_reads_each_predecessors_results() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    let services = services(default_config(), &fs);
    let invoker = Arc::new(ScriptedInvoker::new(services.fs.clone()));

    let search = services
        .orchestrator
        .submit(&[PendingJobRequest::new(JobType::Search)])?;
    let plan = plan_visualization(
        services.store.as_ref(),
        &search,
        JobOptions::new(),
        None,
        None,
    )?;
    let ids = services.orchestrator.submit_batch(&plan)?;

    // The extraction waits on the search that is still queued.
    let extract = services.store.fetch(&ids[0])?;
    assert_eq!(extract.status, JobStatus::Waiting);
    assert_eq!(extract.depending_on.as_ref(), Some(&search));

    let dyn_invoker: Arc<dyn ToolInvoker> = invoker.clone();
    with_timeout(services.worker_pool(dyn_invoker).run_until_idle()).await?;

    let invocations = invoker.invocations();
    let order: Vec<_> = invocations.iter().map(|i| i.job.clone()).collect();
    assert_eq!(order, vec![search.clone(), ids[0].clone(), ids[1].clone()]);
    assert_eq!(invocations[0].basis_results, None);
    assert_eq!(
        invocations[1].basis_results,
        Some(services.lifecycle.paths(&search).results)
    );
    assert_eq!(
        invocations[2].basis_results,
        Some(services.lifecycle.paths(&ids[0]).results)
    );
    for id in &ids {
        assert_eq!(services.store.fetch(id)?.status, JobStatus::Finished);
    }
    Ok(())
}

#[tokio::test]
async fn failing_stored_basis_fails_its_dependent() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    let services = services(default_config(), &fs);
    let invoker = Arc::new(
        ScriptedInvoker::new(services.fs.clone())
            .script(JobType::Search, Script::exit(1, "ERROR - no hits\n")),
    );

    let search = services
        .orchestrator
        .submit(&[PendingJobRequest::new(JobType::Search)])?;
    let recompute = services
        .orchestrator
        .submit(&[PendingJobRequest::new(JobType::Recompute).with_basis(search.clone())])?;

    let dyn_invoker: Arc<dyn ToolInvoker> = invoker.clone();
    with_timeout(services.worker_pool(dyn_invoker).run_until_idle()).await?;

    assert_eq!(services.store.fetch(&search)?.status, JobStatus::Failed);
    let job = services.store.fetch(&recompute)?;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.start_time.is_none());
    assert_eq!(invoker.invoked().len(), 1);
    let log = fs.read_to_string(&services.lifecycle.paths(&recompute).log_file)?;
    assert!(log.contains(&format!("Preceding job {search} failed")));
    Ok(())
}

#[tokio::test]
async fn clinker_limit_counts_the_basis_cluster_files() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    let config = ConfigFileBuilder::new()
        .jobs_dir("/jobs")
        .max_clusters_to_plot(3)
        .build();
    let services = services(config, &fs);
    let invoker = Arc::new(ScriptedInvoker::new(services.fs.clone()));

    let search = JobBuilder::new("S100S100S100S10", JobType::Search).insert(services.store.as_ref());
    let small = JobBuilder::new("E100E100E100E10", JobType::ExtractClusters)
        .root(search.id.as_str())
        .insert(services.store.as_ref());
    let large = JobBuilder::new("E200E200E200E20", JobType::ExtractClusters)
        .root(search.id.as_str())
        .insert(services.store.as_ref());

    let small_paths = services.lifecycle.paths(&small.id);
    for i in 0..3 {
        fs.add_file(small_paths.results.join(format!("cluster_{i}.gbk")), "LOCUS");
    }
    fs.add_file(&small_paths.manifest, "");
    let large_paths = services.lifecycle.paths(&large.id);
    for i in 0..4 {
        fs.add_file(large_paths.results.join(format!("cluster_{i}.gbk")), "LOCUS");
    }

    let allowed = services
        .orchestrator
        .submit(&[PendingJobRequest::new(JobType::Clinker).with_basis(small.id.clone())])?;
    let rejected = services
        .orchestrator
        .submit(&[PendingJobRequest::new(JobType::Clinker).with_basis(large.id.clone())])?;

    let dyn_invoker: Arc<dyn ToolInvoker> = invoker.clone();
    with_timeout(services.worker_pool(dyn_invoker).run_until_idle()).await?;

    assert_eq!(services.store.fetch(&allowed)?.status, JobStatus::Finished);
    assert_eq!(services.store.fetch(&rejected)?.status, JobStatus::Failed);
    let invoked: Vec<_> = invoker.invoked().into_iter().map(|(id, _)| id).collect();
    assert_eq!(invoked, vec![allowed]);

    let log = fs.read_to_string(&services.lifecycle.paths(&rejected).log_file)?;
    assert!(log.contains("Too many selected clusters (4 > 3)"), "{log}");
    Ok(())
}
