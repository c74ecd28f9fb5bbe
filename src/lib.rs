// src/lib.rs

pub mod app;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod failure;
pub mod fs;
pub mod ids;
pub mod layout;
pub mod lineage;
pub mod logging;
pub mod progress;
pub mod queue;
pub mod refdb;
pub mod retention;
pub mod store;
pub mod types;

use std::sync::Arc;

use anyhow::{Result, anyhow};
use tracing::{info, warn};

use crate::app::Services;
use crate::cli::{CliArgs, Command};
use crate::config::load_or_default;
use crate::exec::ShellToolInvoker;
use crate::failure::failure_reason;
use crate::lineage::{connected_jobs, load_batch, plan_visualization};
use crate::queue::WorkQueue;
use crate::types::{JobId, JobOptions, JobStatus, OptionValue, display_time};

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_or_default(&args.config)?;
    let services = Services::from_config(cfg)?;

    match args.command {
        Command::Submit { batch, wait } => {
            let requests = load_batch(&batch)?;
            let ids = services.orchestrator.submit_batch(&requests)?;
            for id in &ids {
                println!("{id}");
            }
            finish_submission(&services, &ids, wait).await
        }
        Command::Visualize {
            basis,
            title,
            email,
            options,
            wait,
        } => {
            let options = parse_options(&options)?;
            let requests = plan_visualization(
                services.store.as_ref(),
                &JobId::new(basis),
                options,
                title,
                email,
            )?;
            let ids = services.orchestrator.submit_batch(&requests)?;
            for id in &ids {
                println!("{id}");
            }
            finish_submission(&services, &ids, wait).await
        }
        Command::Run => {
            let pending = services.queue.len()?;
            info!(pending, "running pending jobs");
            run_queue(&services).await
        }
        Command::Status { id } => print_status(&services, &JobId::new(id)),
        Command::Progress { id } => {
            let progress = services.tracker.progress(&JobId::new(id))?;
            println!("{}/{}", progress.completed, progress.total);
            Ok(())
        }
        Command::Related { id } => {
            for job in connected_jobs(services.store.as_ref(), &JobId::new(id))? {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    job.relation,
                    job.id,
                    job.job_type,
                    job.status,
                    job.title.as_deref().unwrap_or("-")
                );
            }
            Ok(())
        }
        Command::Sweep {
            retention_days,
            dry_run,
        } => {
            let days = retention_days.unwrap_or(services.config.config.retention_days);
            let report = services
                .sweeper
                .sweep_at(std::time::SystemTime::now(), days, dry_run)?;
            for id in &report.deleted {
                println!("{}{id}", if dry_run { "would remove " } else { "removed " });
            }
            for id in &report.failed {
                println!("could not remove {id}");
            }
            info!(
                removed = report.deleted.len(),
                failed = report.failed.len(),
                kept_persistent = report.kept_persistent.len(),
                dry_run,
                "sweep complete"
            );
            Ok(())
        }
        Command::Stats => {
            let info = services.orchestrator.server_info()?;
            println!("status: {}", info.status);
            println!("queued: {}", info.queued);
            println!("running: {}", info.running);
            println!("completed: {}", info.completed);
            Ok(())
        }
        Command::Databases => {
            let dbs = services
                .reference_databases()
                .ok_or_else(|| anyhow!("[config].reference_db_dir is not set"))?;
            for (organism, genera) in dbs.refresh()? {
                println!("{organism}: {}", genera.join(", "));
            }
            Ok(())
        }
    }
}

async fn finish_submission(services: &Services, ids: &[JobId], wait: bool) -> Result<()> {
    if !wait {
        warn!("jobs were stored but not started; run `jobchain run` or pass --wait to execute them");
        return Ok(());
    }

    run_queue(services).await?;

    for id in ids {
        let job = services.store.fetch(id)?;
        println!("{id}\t{}", job.status);
    }
    Ok(())
}

async fn run_queue(services: &Services) -> Result<()> {
    let invoker = Arc::new(ShellToolInvoker::new(
        services.config.tool.clone(),
        Arc::clone(&services.fs),
    )?);
    services.worker_pool(invoker).run_until_idle().await?;
    Ok(())
}

fn print_status(services: &Services, id: &JobId) -> Result<()> {
    let job = services.store.fetch(id)?;
    println!("id: {}", job.id);
    println!("type: {}", job.job_type);
    println!("status: {}", job.status);
    if let Some(title) = &job.title {
        println!("title: {title}");
    }
    println!("posted: {}", display_time(&job.post_time));
    if let Some(t) = &job.start_time {
        println!("started: {}", display_time(t));
    }
    if let Some(t) = &job.finish_time {
        println!("finished: {}", display_time(t));
    }
    match &job.main_search_job {
        Some(root) => println!("main search job: {root}"),
        None => println!("main search job: (this job)"),
    }
    if let Some(dep) = &job.depending_on {
        println!("depending on: {dep}");
    }
    if !job.child_jobs.is_empty() {
        let children: Vec<&str> = job.child_jobs.iter().map(JobId::as_str).collect();
        println!("child jobs: {}", children.join(", "));
    }
    if job.status == JobStatus::Failed {
        let paths = services.lifecycle.paths(id);
        println!(
            "failure reason: {}",
            failure_reason(services.fs.as_ref(), &paths, &services.config.failure_reasons)
        );
    }
    let downstream: Vec<&str> = job.job_type.downstream().iter().map(|t| t.as_str()).collect();
    if job.status == JobStatus::Finished && !downstream.is_empty() {
        println!("downstream: {}", downstream.join(", "));
    }
    Ok(())
}

/// Parse `key=value` / `key` CLI options.
fn parse_options(raw: &[String]) -> Result<JobOptions> {
    let mut options = JobOptions::new();
    for item in raw {
        let (key, value) = match item.split_once('=') {
            Some((k, v)) => (k.trim(), OptionValue::Text(v.trim().to_string())),
            None => (item.trim(), OptionValue::Flag(true)),
        };
        if key.is_empty() {
            return Err(anyhow!("invalid option '{item}'"));
        }
        options.insert(key.to_string(), value);
    }
    Ok(options)
}
