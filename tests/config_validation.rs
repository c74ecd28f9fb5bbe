// tests/config_validation.rs

use jobchain_test_utils::builders::ConfigFileBuilder;
use jobchain_test_utils::init_tracing;

use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::tempdir;

use jobchain::config::{
    ConfigFile, ProgressMode, RawConfigFile, load_and_validate, load_or_default, parse_duration,
};
use jobchain::errors::JobchainError;
use jobchain::types::{JobId, JobType};

type TestResult = Result<(), Box<dyn Error>>;

fn expect_config_error(raw: RawConfigFile, needle: &str) {
    match ConfigFile::try_from(raw) {
        Err(JobchainError::ConfigError(msg)) => {
            assert!(msg.contains(needle), "'{msg}' does not mention '{needle}'")
        }
        other => panic!("expected ConfigError mentioning '{needle}', got {other:?}"),
    }
}

#[test]
fn empty_file_yields_defaults() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let path = dir.path().join("Jobchain.toml");
    fs::write(&path, "")?;

    let cfg = load_and_validate(&path)?;

    assert_eq!(cfg.config.jobs_dir, PathBuf::from("jobs"));
    assert_eq!(cfg.config.workers, 2);
    assert_eq!(cfg.config.job_timeout, Duration::from_secs(8 * 60 * 60));
    assert_eq!(cfg.config.retention_days, 31);
    assert_eq!(cfg.config.progress_mode, ProgressMode::Lenient);
    assert!(cfg.is_persistent(&JobId::new("W885A828D304Y06")));
    assert_eq!(cfg.config.persistent_jobs.len(), 6);
    assert_eq!(cfg.thresholds.maximum_gne_samples, 300);
    assert_eq!(cfg.failure_reasons.len(), 4);
    assert!(cfg.tool.is_empty());
    Ok(())
}

#[test]
fn full_file_is_parsed() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("custom.toml");
    fs::write(
        &path,
        r#"
[config]
jobs_dir = "/srv/jobs"
database = "/srv/jobs/jobchain.sqlite"
workers = 4
job_timeout = "90m"
retention_days = 14
persistent_jobs = ["K814Y501M103S02"]
progress_mode = "sequential"

[notify]
outbox = "/srv/outbox"
base_url = "https://example.org/"

[thresholds]
max_clusters_to_plot = 50

[failure_reasons]
"Too many samples" = "Lower the sample count."
"MemoryError" = "The job ran out of memory."

[tool.search]
cmd = "cblaster search {options}"

[tool.clinker_query]
cmd = "cblaster plot_clusters {options}"
"#,
    )?;

    let cfg = load_and_validate(&path)?;

    assert_eq!(cfg.config.workers, 4);
    assert_eq!(cfg.config.job_timeout, Duration::from_secs(90 * 60));
    assert_eq!(cfg.config.progress_mode, ProgressMode::Sequential);
    assert_eq!(cfg.config.persistent_jobs.len(), 1);
    assert_eq!(cfg.notify.outbox, Some(PathBuf::from("/srv/outbox")));
    assert_eq!(cfg.thresholds.max_clusters_to_plot, 50);
    assert_eq!(cfg.thresholds.maximum_clusters_to_extract, 150);
    assert!(cfg.tool.contains_key(&JobType::Search));
    assert!(cfg.tool.contains_key(&JobType::ClinkerQuery));

    assert_eq!(cfg.failure_reasons.len(), 5);
    let samples = cfg
        .failure_reasons
        .iter()
        .find(|(sig, _)| sig == "Too many samples")
        .map(|(_, reason)| reason.as_str());
    assert_eq!(samples, Some("Lower the sample count."));
    Ok(())
}

#[test]
fn invalid_values_are_rejected() {
    let mut raw = ConfigFileBuilder::new().workers(0).raw();
    expect_config_error(raw, "workers");

    raw = ConfigFileBuilder::new().job_timeout("soon").raw();
    expect_config_error(raw, "job_timeout");

    raw = ConfigFileBuilder::new().job_timeout("0s").raw();
    expect_config_error(raw, "job_timeout");

    raw = ConfigFileBuilder::new().persistent_jobs(&["not-an-id"]).raw();
    expect_config_error(raw, "persistent_jobs");

    raw = ConfigFileBuilder::new().tool("blast", "blastp").raw();
    expect_config_error(raw, "tool.blast");

    raw = ConfigFileBuilder::new().tool("gne", "  ").raw();
    expect_config_error(raw, "cmd");

    raw = ConfigFileBuilder::new().max_gne_samples(0).raw();
    expect_config_error(raw, "maximum_gne_samples");

    raw = ConfigFileBuilder::new().raw();
    raw.config.retention_days = 0;
    expect_config_error(raw, "retention_days");

    raw = ConfigFileBuilder::new().raw();
    raw.notify.base_url = "http://localhost:5000".into();
    expect_config_error(raw, "base_url");
}

#[test]
fn unknown_keys_are_a_parse_error() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[config]\nworkres = 3\n")?;

    assert!(matches!(
        load_and_validate(&path),
        Err(JobchainError::TomlError(_))
    ));
    Ok(())
}

#[test]
fn missing_explicit_config_is_an_error() -> TestResult {
    let dir = tempdir()?;
    let missing = dir.path().join("absent.toml");
    assert!(matches!(
        load_or_default(&missing),
        Err(JobchainError::IoError(_))
    ));
    Ok(())
}

#[test]
fn durations() {
    assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
    assert_eq!(parse_duration("3s"), Ok(Duration::from_secs(3)));
    assert_eq!(parse_duration(" 2m "), Ok(Duration::from_secs(120)));
    assert_eq!(parse_duration("8h"), Ok(Duration::from_secs(8 * 3600)));
    assert!(parse_duration("").is_err());
    assert!(parse_duration("10").is_err());
    assert!(parse_duration("5d").is_err());
    assert!(parse_duration("h").is_err());
}

#[test]
fn oversized_durations_are_rejected() {
    let err = parse_duration("6000000000000000h").unwrap_err();
    assert!(err.contains("too large"), "{err}");
    assert!(parse_duration(&format!("{}m", u64::MAX)).is_err());
    assert_eq!(
        parse_duration(&format!("{}s", u64::MAX)),
        Ok(Duration::from_secs(u64::MAX))
    );
}
