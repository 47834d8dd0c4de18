// src/exec/quality.rs

//! Data-quality evaluation for a single table.

use crate::dag::QualityCheckSpec;
use crate::errors::ExecutionError;
use crate::exec::backend::{Row, SqlValue, StatementExecutor};

/// Verdict for one checked table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityCheckResult {
    pub table: String,
    pub row_count: u64,
    pub passed: bool,
    /// Why the table failed, when it did.
    pub detail: Option<String>,
}

pub fn row_count_query(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {table}")
}

/// Count rows in `table` and, if given, evaluate `assertion`.
///
/// Data problems (empty table, falsy assertion) produce a failed result.
/// Executor failures are returned as errors: no verdict was reached.
pub async fn check_table(
    executor: &dyn StatementExecutor,
    table: &str,
    assertion: Option<&str>,
) -> Result<QualityCheckResult, ExecutionError> {
    let query = row_count_query(table);
    let rows = executor.run_query(&query).await?;

    let Some(count) = first_value(&rows).and_then(|v| v.as_i64()) else {
        return Ok(QualityCheckResult {
            table: table.to_string(),
            row_count: 0,
            passed: false,
            detail: Some("row count query returned no results".to_string()),
        });
    };
    let row_count = u64::try_from(count).unwrap_or(0);

    if row_count == 0 {
        return Ok(QualityCheckResult {
            table: table.to_string(),
            row_count,
            passed: false,
            detail: Some("table is empty".to_string()),
        });
    }

    if let Some(sql) = assertion {
        let rows = executor.run_query(sql).await?;
        let holds = first_value(&rows).is_some_and(|v| v.is_truthy());
        if !holds {
            return Ok(QualityCheckResult {
                table: table.to_string(),
                row_count,
                passed: false,
                detail: Some(format!("assertion failed: {sql}")),
            });
        }
    }

    Ok(QualityCheckResult {
        table: table.to_string(),
        row_count,
        passed: true,
        detail: None,
    })
}

/// Check every table of `checks` in order, without stopping at the first
/// failing table.
///
/// An executor error is different: no verdict exists for that table, so the
/// remaining tables are skipped and the error is returned for a retry.
pub async fn run_quality_checks(
    checks: &QualityCheckSpec,
    executor: &dyn StatementExecutor,
) -> Result<Vec<QualityCheckResult>, ExecutionError> {
    let mut results = Vec::with_capacity(checks.tables.len());
    for table in checks.tables.iter() {
        let assertion = checks.assertions.get(table).map(String::as_str);
        results.push(check_table(executor, table, assertion).await?);
    }
    Ok(results)
}

fn first_value(rows: &[Row]) -> Option<&SqlValue> {
    rows.first().and_then(|row| row.first())
}
