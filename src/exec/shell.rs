// src/exec/shell.rs

//! Warehouse executor that shells out to a SQL client.
//!
//! Every call spawns its own client process (e.g. `psql ... -At`) and pipes
//! the statement on stdin, so concurrent tasks never share a connection.
//! Query output is read from stdout, one row per line, with fields split on
//! the configured separator.

use std::process::Stdio;
use std::sync::LazyLock;

use regex::Regex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::model::ConnectionConfig;
use crate::dag::{FormatDescriptor, SourceLocation};
use crate::errors::ExecutionError;
use crate::exec::backend::{ExecFuture, Row, SqlValue, StatementExecutor};

/// psql exits with 2 when the connection to the server went bad.
const CONNECTION_FAILURE_EXIT_CODE: i32 = 2;

const STATEMENT_PREVIEW_LEN: usize = 120;

static SOURCE_NOT_FOUND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(S3 prefix '[^']*' does not exist|NoSuchBucket|NoSuchKey|specified bucket does not exist)",
    )
    .expect("source-not-found pattern is valid")
});

#[derive(Debug, Clone)]
pub struct ShellStatementExecutor {
    program: String,
    args: Vec<String>,
    field_separator: String,
    iam_role: Option<String>,
    region: Option<String>,
}

impl ShellStatementExecutor {
    pub fn new(cfg: &ConnectionConfig) -> Self {
        Self {
            program: cfg.program.clone(),
            args: cfg.args.clone(),
            field_separator: cfg.field_separator.clone(),
            iam_role: cfg.iam_role.clone(),
            region: cfg.region.clone(),
        }
    }

    /// Render the `COPY` statement used for bulk loads.
    pub fn render_copy(
        &self,
        target_table: &str,
        source: &SourceLocation,
        format: &FormatDescriptor,
    ) -> String {
        render_copy(
            target_table,
            source,
            format,
            self.iam_role.as_deref(),
            self.region.as_deref(),
        )
    }

    async fn invoke(
        &self,
        sql: &str,
        source: Option<&SourceLocation>,
    ) -> Result<String, ExecutionError> {
        debug!(program = %self.program, statement = %preview(sql), "invoking SQL client");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            ExecutionError::Transport(format!("spawning SQL client '{}': {e}", self.program))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(sql.as_bytes())
                .await
                .map_err(|e| ExecutionError::Transport(format!("writing statement: {e}")))?;
            // Closing stdin lets the client run the script and exit.
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ExecutionError::Transport(format!("waiting for SQL client: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let code = output.status.code().unwrap_or(-1);
            warn!(exit_code = code, error = %stderr, "SQL client reported failure");
            return Err(classify_failure(sql, code, stderr, source));
        }

        String::from_utf8(output.stdout).map_err(|e| ExecutionError::Decode(e.to_string()))
    }
}

impl StatementExecutor for ShellStatementExecutor {
    fn run_statement<'a>(&'a self, sql: &'a str) -> ExecFuture<'a, ()> {
        Box::pin(async move {
            self.invoke(sql, None).await?;
            Ok(())
        })
    }

    fn run_query<'a>(&'a self, sql: &'a str) -> ExecFuture<'a, Vec<Row>> {
        Box::pin(async move {
            let stdout = self.invoke(sql, None).await?;
            Ok(parse_rows(&stdout, &self.field_separator))
        })
    }

    fn bulk_load<'a>(
        &'a self,
        target_table: &'a str,
        source: &'a SourceLocation,
        format: &'a FormatDescriptor,
    ) -> ExecFuture<'a, ()> {
        Box::pin(async move {
            let copy = self.render_copy(target_table, source, format);
            self.invoke(&copy, Some(source)).await?;
            Ok(())
        })
    }
}

/// Render a Redshift-style `COPY` statement.
pub fn render_copy(
    target_table: &str,
    source: &SourceLocation,
    format: &FormatDescriptor,
    iam_role: Option<&str>,
    region: Option<&str>,
) -> String {
    let mut sql = format!("COPY {target_table} FROM '{}'", source.uri());

    if let Some(role) = iam_role {
        sql.push_str(&format!(" IAM_ROLE '{role}'"));
    }
    if let Some(region) = region {
        sql.push_str(&format!(" REGION '{region}'"));
    }

    match format {
        FormatDescriptor::JsonAuto => sql.push_str(" FORMAT AS JSON 'auto'"),
        FormatDescriptor::JsonPaths(uri) => sql.push_str(&format!(" FORMAT AS JSON '{uri}'")),
        FormatDescriptor::Csv {
            delimiter,
            ignore_header,
        } => {
            sql.push_str(&format!(" CSV DELIMITER '{delimiter}'"));
            if *ignore_header > 0 {
                sql.push_str(&format!(" IGNOREHEADER {ignore_header}"));
            }
        }
    }

    sql.push(';');
    sql
}

/// Split client output into rows. Blank lines are skipped.
pub fn parse_rows(stdout: &str, separator: &str) -> Vec<Row> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.split(separator)
                .map(|field| SqlValue::parse_text(field.trim()))
                .collect()
        })
        .collect()
}

fn classify_failure(
    sql: &str,
    exit_code: i32,
    stderr: String,
    source: Option<&SourceLocation>,
) -> ExecutionError {
    if let Some(source) = source {
        if SOURCE_NOT_FOUND.is_match(&stderr) {
            return ExecutionError::SourceNotFound {
                location: source.uri(),
            };
        }
    }

    if exit_code == CONNECTION_FAILURE_EXIT_CODE {
        return ExecutionError::Transport(stderr);
    }

    ExecutionError::Statement {
        statement: preview(sql),
        message: stderr,
    }
}

fn preview(sql: &str) -> String {
    let flat = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= STATEMENT_PREVIEW_LEN {
        flat
    } else {
        let cut: String = flat.chars().take(STATEMENT_PREVIEW_LEN).collect();
        format!("{cut}...")
    }
}
