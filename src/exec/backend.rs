// src/exec/backend.rs

//! Pluggable warehouse executor abstraction.
//!
//! Task behaviours talk to a `StatementExecutor` instead of a concrete
//! connection. This makes it easy to swap in a fake executor in tests while
//! keeping the production implementation in [`shell`](super::shell).
//!
//! Implementations must be safe to call from several tasks at once: either
//! use one connection per call or draw from a pool. Two tasks must never
//! share a single connection concurrently.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::dag::{FormatDescriptor, SourceLocation};
use crate::errors::ExecutionError;

/// Boxed future returned by executor calls.
pub type ExecFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ExecutionError>> + Send + 'a>>;

/// A single value returned by a query.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SqlValue {
    /// Interpret the value as a count.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            SqlValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Falsy values are NULL, `false`, zero and the empty string.
    pub fn is_truthy(&self) -> bool {
        match self {
            SqlValue::Null => false,
            SqlValue::Bool(b) => *b,
            SqlValue::Int(v) => *v != 0,
            SqlValue::Float(v) => *v != 0.0,
            SqlValue::Text(s) => !s.is_empty(),
        }
    }

    /// Best-effort conversion of textual client output.
    pub fn parse_text(raw: &str) -> Self {
        if raw.is_empty() {
            return SqlValue::Null;
        }
        match raw {
            "t" | "true" => return SqlValue::Bool(true),
            "f" | "false" => return SqlValue::Bool(false),
            _ => {}
        }
        if let Ok(v) = raw.parse::<i64>() {
            return SqlValue::Int(v);
        }
        if let Ok(v) = raw.parse::<f64>() {
            return SqlValue::Float(v);
        }
        SqlValue::Text(raw.to_string())
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Bool(b) => write!(f, "{b}"),
            SqlValue::Int(v) => write!(f, "{v}"),
            SqlValue::Float(v) => write!(f, "{v}"),
            SqlValue::Text(s) => f.write_str(s),
        }
    }
}

pub type Row = Vec<SqlValue>;

/// Trait abstracting how statements reach the warehouse.
///
/// Production code uses [`ShellStatementExecutor`](super::ShellStatementExecutor);
/// tests can provide their own implementation that records calls.
pub trait StatementExecutor: Send + Sync {
    /// Execute a statement (or script) that returns no rows.
    fn run_statement<'a>(&'a self, sql: &'a str) -> ExecFuture<'a, ()>;

    /// Execute a query and return its rows.
    fn run_query<'a>(&'a self, sql: &'a str) -> ExecFuture<'a, Vec<Row>>;

    /// Bulk-copy every object under `source` into `target_table`.
    fn bulk_load<'a>(
        &'a self,
        target_table: &'a str,
        source: &'a SourceLocation,
        format: &'a FormatDescriptor,
    ) -> ExecFuture<'a, ()>;
}
