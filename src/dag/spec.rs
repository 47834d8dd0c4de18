// src/dag/spec.rs

//! Immutable task descriptions.
//!
//! A [`TaskSpec`] pairs a unique name with a [`TaskBehavior`]. Each behaviour
//! carries only the fields it needs, so the runner can `match` on it without
//! any "field not set" checks.

use std::collections::BTreeMap;
use std::fmt;

use crate::engine::TaskName;
use crate::types::{ResetPolicy, TaskKind};

/// Which structural marker a sentinel task is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentinelRole {
    Begin,
    End,
}

/// Object-store location of staging input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub bucket: String,
    /// Key or prefix inside the bucket (e.g. `"log-data"`).
    pub prefix: String,
}

impl SourceLocation {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    /// `s3://bucket/prefix` form used in copy commands and error messages.
    pub fn uri(&self) -> String {
        let prefix = self.prefix.trim_start_matches('/');
        if prefix.is_empty() {
            format!("s3://{}", self.bucket)
        } else {
            format!("s3://{}/{}", self.bucket, prefix)
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

/// How the bulk loader should interpret staged objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatDescriptor {
    /// JSON with automatic column mapping.
    JsonAuto,
    /// JSON mapped through a JSONPaths file (full URI).
    JsonPaths(String),
    Csv { delimiter: char, ignore_header: u32 },
}

impl Default for FormatDescriptor {
    fn default() -> Self {
        FormatDescriptor::JsonAuto
    }
}

/// Payload shared by fact and dimension loads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSpec {
    pub target_table: String,
    /// Read query whose result rows are inserted into `target_table`.
    pub load_query: String,
    pub reset: ResetPolicy,
}

/// Tables to validate, in order, plus optional per-table SQL assertions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QualityCheckSpec {
    pub tables: Vec<String>,
    /// table name -> query whose first value must be truthy.
    pub assertions: BTreeMap<String, String>,
}

impl QualityCheckSpec {
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
            assertions: BTreeMap::new(),
        }
    }

    pub fn with_assertion(mut self, table: impl Into<String>, sql: impl Into<String>) -> Self {
        self.assertions.insert(table.into(), sql.into());
        self
    }
}

/// Closed set of task behaviours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskBehavior {
    Sentinel(SentinelRole),
    Statement {
        sql: String,
    },
    Stage {
        target_table: String,
        source: SourceLocation,
        format: FormatDescriptor,
    },
    LoadFact(LoadSpec),
    LoadDimension(LoadSpec),
    QualityCheck(QualityCheckSpec),
}

/// Immutable description of one unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    name: TaskName,
    behavior: TaskBehavior,
}

impl TaskSpec {
    pub fn new(name: impl Into<TaskName>, behavior: TaskBehavior) -> Self {
        Self {
            name: name.into(),
            behavior,
        }
    }

    pub fn begin(name: impl Into<TaskName>) -> Self {
        Self::new(name, TaskBehavior::Sentinel(SentinelRole::Begin))
    }

    pub fn end(name: impl Into<TaskName>) -> Self {
        Self::new(name, TaskBehavior::Sentinel(SentinelRole::End))
    }

    pub fn statement(name: impl Into<TaskName>, sql: impl Into<String>) -> Self {
        Self::new(name, TaskBehavior::Statement { sql: sql.into() })
    }

    pub fn stage(
        name: impl Into<TaskName>,
        target_table: impl Into<String>,
        source: SourceLocation,
        format: FormatDescriptor,
    ) -> Self {
        Self::new(
            name,
            TaskBehavior::Stage {
                target_table: target_table.into(),
                source,
                format,
            },
        )
    }

    /// Fact load; clears the table first unless `reset` says otherwise.
    pub fn load_fact(
        name: impl Into<TaskName>,
        target_table: impl Into<String>,
        load_query: impl Into<String>,
        reset: ResetPolicy,
    ) -> Self {
        Self::new(
            name,
            TaskBehavior::LoadFact(LoadSpec {
                target_table: target_table.into(),
                load_query: load_query.into(),
                reset,
            }),
        )
    }

    pub fn load_dimension(
        name: impl Into<TaskName>,
        target_table: impl Into<String>,
        load_query: impl Into<String>,
        reset: ResetPolicy,
    ) -> Self {
        Self::new(
            name,
            TaskBehavior::LoadDimension(LoadSpec {
                target_table: target_table.into(),
                load_query: load_query.into(),
                reset,
            }),
        )
    }

    pub fn quality_check<I, S>(name: impl Into<TaskName>, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(name, TaskBehavior::QualityCheck(QualityCheckSpec::new(tables)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn behavior(&self) -> &TaskBehavior {
        &self.behavior
    }

    pub fn kind(&self) -> TaskKind {
        match self.behavior {
            TaskBehavior::Sentinel(_) => TaskKind::Sentinel,
            TaskBehavior::Statement { .. } => TaskKind::Statement,
            TaskBehavior::Stage { .. } => TaskKind::Stage,
            TaskBehavior::LoadFact(_) => TaskKind::LoadFact,
            TaskBehavior::LoadDimension(_) => TaskKind::LoadDimension,
            TaskBehavior::QualityCheck(_) => TaskKind::QualityCheck,
        }
    }

    pub fn sentinel_role(&self) -> Option<SentinelRole> {
        match self.behavior {
            TaskBehavior::Sentinel(role) => Some(role),
            _ => None,
        }
    }

    /// Table written by this task, if any.
    pub fn target_table(&self) -> Option<&str> {
        match &self.behavior {
            TaskBehavior::Stage { target_table, .. } => Some(target_table),
            TaskBehavior::LoadFact(load) | TaskBehavior::LoadDimension(load) => {
                Some(&load.target_table)
            }
            _ => None,
        }
    }
}
