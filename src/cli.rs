// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `jobchain`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "jobchain",
    version,
    about = "Submit chained analysis jobs and track their lifecycle.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Jobchain.toml` in the current working directory. Built-in
    /// defaults are used when that file does not exist.
    #[arg(long, value_name = "PATH", default_value = "Jobchain.toml", global = true)]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `JOBCHAIN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Submit a batch file of `[[job]]` entries.
    Submit {
        batch: PathBuf,

        /// Run the jobs in-process and return once all of them ended.
        #[arg(long)]
        wait: bool,
    },

    /// Submit a cluster visualization of a previous job, inserting a cluster
    /// extraction first when needed.
    Visualize {
        basis: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        email: Option<String>,

        /// Tool option as `key=value`, or `key` for a flag. Repeatable.
        #[arg(long = "option", value_name = "KEY[=VALUE]")]
        options: Vec<String>,

        #[arg(long)]
        wait: bool,
    },

    /// Run every pending job, including those left by earlier submissions,
    /// until the queue is idle.
    Run,

    /// Show a job, its lineage and, for failed jobs, the failure reason.
    Status { id: String },

    /// Show `completed/total` stages of a job.
    Progress { id: String },

    /// List jobs connected to a job.
    Related { id: String },

    /// Remove job directories older than the retention window.
    Sweep {
        #[arg(long)]
        retention_days: Option<u32>,

        /// Only report what would be removed.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show queue and job counters.
    Stats,

    /// Rescan and list the available reference databases.
    Databases,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
