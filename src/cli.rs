// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::default_config_path;

/// Command-line arguments for `stagedag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "stagedag",
    version,
    about = "Run a warehouse load pipeline (stage, load, check) as a dependency graph.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline definition (TOML).
    ///
    /// Default: `Stagedag.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `STAGEDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the execution layers, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,
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
