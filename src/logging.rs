// src/logging.rs

//! Logging setup for `stagedag` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `STAGEDAG_LOG` environment variable, either a bare level ("debug") or a
//!    full filter directive ("stagedag::engine=debug,warn")
//! 3. default to `info`
//!
//! Logs go to STDERR; stdout carries only the run report.

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "STAGEDAG_LOG";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(lvl) => level_filter(level_from_log_level(lvl)),
        None => std::env::var(LOG_ENV_VAR)
            .ok()
            .and_then(|s| filter_from_env_str(&s))
            .unwrap_or_else(|| EnvFilter::new("info")),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;

    Ok(())
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

/// A bare level wins; anything else is tried as a filter directive.
fn filter_from_env_str(s: &str) -> Option<EnvFilter> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(level) = parse_level_str(s) {
        return Some(level_filter(level));
    }
    EnvFilter::try_new(s).ok()
}

fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}

fn level_filter(level: tracing::Level) -> EnvFilter {
    EnvFilter::new(level.as_str().to_ascii_lowercase())
}
