// src/errors.rs

//! Crate-wide error types.
//!
//! Errors are layered the same way the pipeline is:
//! - [`ExecutionError`] is what a `StatementExecutor` reports.
//! - [`TaskError`] is what a single task run reports to the engine.
//! - [`GraphError`] covers structural problems in the task graph.
//! - [`PipelineError`] is the aggregated result of a failed run.
//! - [`StagedagError`] is used by config loading and the CLI.

use thiserror::Error;

use crate::engine::report::RunReport;
use crate::engine::TaskName;
use crate::exec::quality::QualityCheckResult;

#[derive(Error, Debug)]
pub enum StagedagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid task graph: {0}")]
    Graph(#[from] GraphError),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, StagedagError>;

/// Structural errors in a [`DependencyGraph`](crate::dag::DependencyGraph).
///
/// These are fatal at graph-build time: a run never starts on an invalid graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("cycle detected in task graph involving task '{0}'")]
    Cycle(TaskName),

    #[error("task '{0}' is defined more than once")]
    DuplicateTask(TaskName),

    #[error("unknown task '{0}'")]
    UnknownTask(TaskName),

    #[error("task '{0}' cannot depend on itself")]
    SelfDependency(TaskName),

    #[error("edge '{0}' -> '{1}' is defined more than once")]
    DuplicateEdge(TaskName, TaskName),

    #[error("task graph has no Begin sentinel")]
    MissingBegin,

    #[error("tasks not reachable from Begin: {}", .0.join(", "))]
    Unreachable(Vec<TaskName>),

    #[error("invalid sentinel '{task}': {reason}")]
    InvalidSentinel { task: TaskName, reason: String },
}

/// Failure reported by a `StatementExecutor`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// The warehouse rejected the statement (syntax, constraint, permissions).
    #[error("statement failed: {message} (statement: {statement})")]
    Statement { statement: String, message: String },

    /// Could not reach the warehouse at all.
    #[error("transport error: {0}")]
    Transport(String),

    /// A bulk load pointed at an object-store location that does not exist.
    #[error("source not found: {location}")]
    SourceNotFound { location: String },

    /// The executor returned output that could not be interpreted.
    #[error("could not decode executor output: {0}")]
    Decode(String),
}

/// Failure of a single task execution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error("staging source not found: {location}")]
    SourceNotFound { location: String },

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("data quality check failed: {}", describe_failures(.failures))]
    QualityCheck { failures: Vec<QualityCheckResult> },

    #[error("invalid task definition for '{task}': {reason}")]
    InvalidSpec { task: TaskName, reason: String },

    /// The task's worker died before reporting (e.g. it panicked).
    #[error("task aborted: {0}")]
    Aborted(String),
}

impl TaskError {
    /// Only statement/transport failures are worth another attempt; missing
    /// sources and failed quality checks reflect real state.
    pub fn is_retryable(&self) -> bool {
        match self {
            TaskError::Execution(ExecutionError::SourceNotFound { .. }) => false,
            TaskError::Execution(_) => true,
            TaskError::SourceNotFound { .. }
            | TaskError::QualityCheck { .. }
            | TaskError::InvalidSpec { .. }
            | TaskError::Aborted(_) => false,
        }
    }
}

fn describe_failures(failures: &[QualityCheckResult]) -> String {
    failures
        .iter()
        .map(|r| match &r.detail {
            Some(detail) => format!("{} ({} rows; {})", r.table, r.row_count, detail),
            None => format!("{} ({} rows)", r.table, r.row_count),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Aggregated outcome of a run that did not complete successfully.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("pipeline graph is invalid: {0}")]
    Graph(#[from] GraphError),

    #[error("pipeline failed; {} task(s) failed: {}", .failed_tasks.len(), .failed_tasks.join(", "))]
    TasksFailed {
        failed_tasks: Vec<TaskName>,
        report: RunReport,
    },

    #[error("pipeline run was cancelled")]
    Cancelled { report: RunReport },
}

impl PipelineError {
    /// The partial report for runs that got past validation.
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            PipelineError::Graph(_) => None,
            PipelineError::TasksFailed { report, .. } | PipelineError::Cancelled { report } => {
                Some(report)
            }
        }
    }
}
