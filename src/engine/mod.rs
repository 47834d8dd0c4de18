// src/engine/mod.rs

//! Orchestration engine for stagedag.
//!
//! This module ties together:
//! - the dependency graph and its topological layers
//! - the task runner, wrapped in the retry policy
//! - per-run task state and the final report
//!
//! The pure per-run state machine lives in [`state`]; the async shell that
//! dispatches layers onto tokio is implemented in [`pipeline`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

use crate::config::model::ConfigFile;
use crate::errors::{Result, StagedagError, TaskError};
use crate::types::parse_duration;

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

/// Result of running one task to a terminal state, retries included.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub attempts: u32,
    pub duration: Duration,
    pub result: std::result::Result<(), TaskError>,
}

/// Process-wide run defaults, passed in explicitly at engine construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Informational; logged at the start of every run.
    pub owner: Option<String>,
    /// Maximum attempts per task (1 = no retries).
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            owner: None,
            max_attempts: 1,
            retry_delay: Duration::ZERO,
        }
    }
}

impl EngineConfig {
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        let section = &cfg.config;
        let retry_delay = parse_duration(&section.retry_delay).map_err(|e| {
            StagedagError::ConfigError(format!("[config].retry_delay: {e}"))
        })?;

        Ok(Self {
            owner: section.owner.clone(),
            max_attempts: section.max_attempts,
            retry_delay,
        })
    }
}

/// Cooperative cancellation flag shared between the engine and its callers.
///
/// Cancelling never interrupts a statement already in flight; it stops new
/// layers and new retry attempts from starting and cuts short any retry
/// backoff in progress. A cancelled engine stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel is not missed.
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

pub mod pipeline;
pub mod report;
pub mod state;

pub use pipeline::PipelineEngine;
pub use report::{RunReport, TaskReport};
pub use state::{RunState, TaskState, TaskStatus};
