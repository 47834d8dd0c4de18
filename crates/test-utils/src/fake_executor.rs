use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stagedag::dag::{FormatDescriptor, SourceLocation};
use stagedag::errors::ExecutionError;
use stagedag::exec::shell::render_copy;
use stagedag::exec::{ExecFuture, Row, SqlValue, StatementExecutor};

/// One call the engine made against the executor, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorCall {
    Statement(String),
    Query(String),
    BulkLoad {
        table: String,
        source: String,
        format: FormatDescriptor,
    },
}

impl ExecutorCall {
    /// SQL text the call stands for; bulk loads render as their `COPY`.
    pub fn sql(&self) -> String {
        match self {
            ExecutorCall::Statement(sql) | ExecutorCall::Query(sql) => sql.clone(),
            ExecutorCall::BulkLoad {
                table,
                source,
                format,
            } => {
                let (bucket, prefix) = split_uri(source);
                render_copy(table, &SourceLocation::new(bucket, prefix), format, None, None)
            }
        }
    }
}

fn split_uri(uri: &str) -> (&str, &str) {
    let rest = uri.trim_start_matches("s3://");
    rest.split_once('/').unwrap_or((rest, ""))
}

struct FailureRule {
    prefix: String,
    error: ExecutionError,
    /// `None` fails forever.
    remaining: Option<u32>,
}

type CallHook = Box<dyn Fn(&ExecutorCall) + Send + Sync>;

/// A scriptable in-memory warehouse:
/// - records every call in a shared log
/// - answers `SELECT COUNT(*) FROM <table>` from configured row counts
/// - fails calls whose SQL starts with a configured prefix
/// - reports configured bulk-load sources as missing.
///
/// Tables without a configured row count report `default_row_count` rows
/// (1 unless changed), so happy-path tests need no setup.
pub struct FakeExecutor {
    calls: Arc<Mutex<Vec<ExecutorCall>>>,
    failures: Mutex<Vec<FailureRule>>,
    row_counts: HashMap<String, i64>,
    default_row_count: i64,
    query_results: HashMap<String, Vec<Row>>,
    missing_sources: HashSet<String>,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    hook: Option<CallHook>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            failures: Mutex::new(Vec::new()),
            row_counts: HashMap::new(),
            default_row_count: 1,
            query_results: HashMap::new(),
            missing_sources: HashSet::new(),
            latency: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            hook: None,
        }
    }

    pub fn with_row_count(mut self, table: &str, rows: i64) -> Self {
        self.row_counts.insert(table.to_string(), rows);
        self
    }

    pub fn with_default_row_count(mut self, rows: i64) -> Self {
        self.default_row_count = rows;
        self
    }

    /// Exact-match result for an arbitrary query (e.g. an assertion).
    pub fn with_query_result(mut self, sql: &str, rows: Vec<Row>) -> Self {
        self.query_results.insert(sql.to_string(), rows);
        self
    }

    /// Every call whose SQL starts with `prefix` fails with `error`.
    pub fn fail_matching(self, prefix: &str, error: ExecutionError) -> Self {
        self.push_failure(prefix, error, None)
    }

    /// The first `times` calls starting with `prefix` fail; later ones succeed.
    pub fn fail_times(self, prefix: &str, times: u32, error: ExecutionError) -> Self {
        self.push_failure(prefix, error, Some(times))
    }

    /// Bulk loads from `uri` (e.g. `s3://bucket/prefix`) report a missing source.
    pub fn with_missing_source(mut self, uri: &str) -> Self {
        self.missing_sources.insert(uri.to_string());
        self
    }

    /// Every call sleeps this long before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Run `hook` synchronously on every call, after it is recorded.
    pub fn on_call<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ExecutorCall) + Send + Sync + 'static,
    {
        self.hook = Some(Box::new(hook));
        self
    }

    fn push_failure(self, prefix: &str, error: ExecutionError, remaining: Option<u32>) -> Self {
        self.failures
            .lock()
            .unwrap()
            .push(FailureRule {
                prefix: prefix.to_string(),
                error,
                remaining,
            });
        self
    }

    /// Shared handle to the call log; stays valid after the executor moved
    /// into an `Arc<dyn StatementExecutor>`.
    pub fn call_log(&self) -> Arc<Mutex<Vec<ExecutorCall>>> {
        Arc::clone(&self.calls)
    }

    pub fn calls(&self) -> Vec<ExecutorCall> {
        self.calls.lock().unwrap().clone()
    }

    /// SQL of every call, in order.
    pub fn sql_log(&self) -> Vec<String> {
        self.calls().iter().map(ExecutorCall::sql).collect()
    }

    /// Highest number of calls that were outstanding at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn handle(&self, call: ExecutorCall) -> Result<Vec<Row>, ExecutionError> {
        let sql = call.sql();
        self.calls.lock().unwrap().push(call.clone());
        if let Some(ref hook) = self.hook {
            hook(&call);
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(err) = self.scripted_failure(&sql) {
            return Err(err);
        }

        match call {
            ExecutorCall::BulkLoad { source, .. } if self.missing_sources.contains(&source) => {
                Err(ExecutionError::SourceNotFound { location: source })
            }
            ExecutorCall::Query(sql) => Ok(self.answer(&sql)),
            _ => Ok(Vec::new()),
        }
    }

    fn scripted_failure(&self, sql: &str) -> Option<ExecutionError> {
        let mut failures = self.failures.lock().unwrap();
        let rule = failures
            .iter_mut()
            .find(|r| sql.starts_with(&r.prefix) && r.remaining != Some(0))?;
        if let Some(ref mut n) = rule.remaining {
            *n -= 1;
        }
        Some(rule.error.clone())
    }

    fn answer(&self, sql: &str) -> Vec<Row> {
        if let Some(rows) = self.query_results.get(sql) {
            return rows.clone();
        }
        if let Some(table) = sql.strip_prefix("SELECT COUNT(*) FROM ") {
            let count = self
                .row_counts
                .get(table.trim())
                .copied()
                .unwrap_or(self.default_row_count);
            return vec![vec![SqlValue::Int(count)]];
        }
        Vec::new()
    }
}

impl Default for FakeExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementExecutor for FakeExecutor {
    fn run_statement<'a>(&'a self, sql: &'a str) -> ExecFuture<'a, ()> {
        Box::pin(async move {
            self.handle(ExecutorCall::Statement(sql.to_string())).await?;
            Ok(())
        })
    }

    fn run_query<'a>(&'a self, sql: &'a str) -> ExecFuture<'a, Vec<Row>> {
        Box::pin(async move { self.handle(ExecutorCall::Query(sql.to_string())).await })
    }

    fn bulk_load<'a>(
        &'a self,
        target_table: &'a str,
        source: &'a SourceLocation,
        format: &'a FormatDescriptor,
    ) -> ExecFuture<'a, ()> {
        Box::pin(async move {
            self.handle(ExecutorCall::BulkLoad {
                table: target_table.to_string(),
                source: source.uri(),
                format: format.clone(),
            })
            .await?;
            Ok(())
        })
    }
}

/// Shorthand for the transient error most retry tests need.
pub fn statement_error(statement: &str) -> ExecutionError {
    ExecutionError::Statement {
        statement: statement.to_string(),
        message: "simulated failure".to_string(),
    }
}
