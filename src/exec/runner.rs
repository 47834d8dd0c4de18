// src/exec/runner.rs

//! Executes one task behaviour against a [`StatementExecutor`].

use tracing::{debug, info, warn};

use crate::dag::{FormatDescriptor, LoadSpec, QualityCheckSpec, SourceLocation, TaskBehavior, TaskSpec};
use crate::errors::{ExecutionError, TaskError};
use crate::exec::backend::StatementExecutor;
use crate::exec::quality::{run_quality_checks, QualityCheckResult};
use crate::types::ResetPolicy;

/// Stateless dispatcher over [`TaskBehavior`].
///
/// A single call is one attempt; retries are the engine's job.
pub struct TaskRunner;

impl TaskRunner {
    pub async fn execute(
        spec: &TaskSpec,
        executor: &dyn StatementExecutor,
    ) -> Result<(), TaskError> {
        match spec.behavior() {
            TaskBehavior::Sentinel(role) => {
                debug!(task = %spec.name(), ?role, "sentinel reached");
                Ok(())
            }
            TaskBehavior::Statement { sql } => {
                info!(task = %spec.name(), "running statement");
                executor.run_statement(sql).await?;
                Ok(())
            }
            TaskBehavior::Stage {
                target_table,
                source,
                format,
            } => stage(spec, target_table, source, format, executor).await,
            TaskBehavior::LoadFact(load) | TaskBehavior::LoadDimension(load) => {
                load_table(spec, load, executor).await
            }
            TaskBehavior::QualityCheck(checks) => quality_check(spec, checks, executor).await,
        }
    }
}

async fn stage(
    spec: &TaskSpec,
    target_table: &str,
    source: &SourceLocation,
    format: &FormatDescriptor,
    executor: &dyn StatementExecutor,
) -> Result<(), TaskError> {
    if source.bucket.trim().is_empty() {
        return Err(TaskError::SourceNotFound {
            location: source.uri(),
        });
    }

    info!(
        task = %spec.name(),
        table = %target_table,
        source = %source,
        ?format,
        "copying staged objects into table"
    );

    match executor.bulk_load(target_table, source, format).await {
        Ok(()) => {
            info!(task = %spec.name(), table = %target_table, "staging copy complete");
            Ok(())
        }
        Err(ExecutionError::SourceNotFound { location }) => {
            warn!(task = %spec.name(), %location, "staging source not found");
            Err(TaskError::SourceNotFound { location })
        }
        Err(e) => Err(TaskError::Execution(e)),
    }
}

/// Delete-then-insert (or insert-only) protocol shared by fact and dimension
/// loads. The insert is never issued if a requested delete failed.
async fn load_table(
    spec: &TaskSpec,
    load: &LoadSpec,
    executor: &dyn StatementExecutor,
) -> Result<(), TaskError> {
    let table = &load.target_table;
    info!(
        task = %spec.name(),
        kind = %spec.kind(),
        %table,
        reset = ?load.reset,
        "loading table"
    );

    if load.reset == ResetPolicy::DeleteAll {
        let delete = format!("DELETE FROM {table}");
        debug!(task = %spec.name(), %table, "clearing table before insert");
        executor.run_statement(&delete).await.inspect_err(|e| {
            warn!(
                task = %spec.name(),
                %table,
                error = %e,
                "delete failed; skipping insert"
            );
        })?;
    }

    let insert = format!("INSERT INTO {table} {}", load.load_query.trim());
    executor.run_statement(&insert).await?;

    info!(task = %spec.name(), %table, "table load complete");
    Ok(())
}

/// Evaluate every table, then report all failures together.
async fn quality_check(
    spec: &TaskSpec,
    checks: &QualityCheckSpec,
    executor: &dyn StatementExecutor,
) -> Result<(), TaskError> {
    if checks.tables.is_empty() {
        return Err(TaskError::InvalidSpec {
            task: spec.name().to_string(),
            reason: "no tables to check".to_string(),
        });
    }

    let results = run_quality_checks(checks, executor).await?;
    for result in results.iter() {
        if result.passed {
            info!(
                task = %spec.name(),
                table = %result.table,
                row_count = result.row_count,
                "data quality check passed"
            );
        } else {
            warn!(
                task = %spec.name(),
                table = %result.table,
                row_count = result.row_count,
                detail = ?result.detail,
                "data quality check failed"
            );
        }
    }

    let failures: Vec<QualityCheckResult> = results.into_iter().filter(|r| !r.passed).collect();
    if failures.is_empty() {
        Ok(())
    } else {
        Err(TaskError::QualityCheck { failures })
    }
}
