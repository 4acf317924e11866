// src/cli.rs

//! CLI argument parsing using `clap`.

use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::config::parse_duration;

/// Command-line arguments for `dagrun`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dagrun",
    version,
    about = "Run a task file as a dependency graph with bounded concurrency.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the task file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Dagrun.toml")]
    pub config: String,

    /// Run the dependency closure of this task.
    ///
    /// Falls back to `[run].entry`, then to the only task nothing depends on.
    #[arg(long, value_name = "NAME")]
    pub entry: Option<String>,

    /// Maximum number of tasks running at once (overrides `[run].concurrency`).
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Stop dispatching new tasks after the first failure.
    #[arg(long)]
    pub stop_on_error: bool,

    /// Overall run timeout, e.g. `30s` or `10m` (overrides `[run].timeout`).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DAGRUN_LOG` or `info` is used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate the task file and print the execution order without running
    /// anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the final run status as JSON on stdout.
    #[arg(long)]
    pub json: bool,
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

pub fn parse() -> CliArgs {
    CliArgs::parse()
}
