// src/exec/mod.rs

//! Task execution layer.
//!
//! - [`backend`] provides the `StatementExecutor` trait the task behaviours
//!   talk to, which tests can replace with a fake implementation.
//! - [`shell`] is the production executor that pipes SQL to a client
//!   process using `tokio::process::Command`.
//! - [`runner`] performs a single task behaviour (stage, load, check).
//! - [`quality`] evaluates per-table data-quality checks.

pub mod backend;
pub mod quality;
pub mod runner;
pub mod shell;

pub use backend::{ExecFuture, Row, SqlValue, StatementExecutor};
pub use quality::QualityCheckResult;
pub use runner::TaskRunner;
pub use shell::ShellStatementExecutor;
