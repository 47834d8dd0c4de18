// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::dag::{FormatDescriptor, QualityCheckSpec, SourceLocation, TaskBehavior, TaskSpec};
use crate::errors::{Result, StagedagError};
use crate::types::ResetPolicy;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// owner = "gracomot"
/// max_attempts = 4
/// retry_delay = "5m"
///
/// [connection]
/// program = "psql"
/// args = ["postgresql://warehouse/dev", "-v", "ON_ERROR_STOP=1", "-At"]
///
/// [task.Begin_execution]
/// kind = "begin"
///
/// [task.Stage_songs]
/// kind = "stage"
/// after = ["Begin_execution"]
/// table = "staging_songs"
/// s3_bucket = "udacity-dend"
/// s3_key = "song-data"
/// ```
///
/// This is the unvalidated form; see [`ConfigFile`].
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Run defaults from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// How to reach the warehouse, from `[connection]`.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// All tasks from `[task.<name>]`.
    ///
    /// Keys are the *task names* (e.g. `"Stage_events"`).
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// Validated configuration.
///
/// Only obtainable through `TryFrom<RawConfigFile>`, which checks field
/// requirements per task kind and the shape of the task graph.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub connection: ConnectionConfig,
    pub task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        connection: ConnectionConfig,
        task: BTreeMap<String, TaskConfig>,
    ) -> Self {
        Self {
            config,
            connection,
            task,
        }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Pipeline owner; informational only.
    #[serde(default)]
    pub owner: Option<String>,

    /// Maximum attempts per task, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts, e.g. `"5m"`.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: String,
}

fn default_max_attempts() -> u32 {
    1
}

fn default_retry_delay() -> String {
    "0s".to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            owner: None,
            max_attempts: default_max_attempts(),
            retry_delay: default_retry_delay(),
        }
    }
}

/// `[connection]` section: the SQL client the shell executor spawns.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_program")]
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Separator between fields in unaligned client output.
    #[serde(default = "default_field_separator")]
    pub field_separator: String,

    /// IAM role used by `COPY` to read from object storage.
    #[serde(default)]
    pub iam_role: Option<String>,

    #[serde(default)]
    pub region: Option<String>,
}

fn default_program() -> String {
    "psql".to_string()
}

fn default_field_separator() -> String {
    "|".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
            field_separator: default_field_separator(),
            iam_role: None,
            region: None,
        }
    }
}

/// `kind = "..."` of a task section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigTaskKind {
    Begin,
    End,
    Statement,
    Stage,
    LoadFact,
    LoadDimension,
    QualityCheck,
}

/// `[task.<name>]` section.
///
/// One flat struct for all kinds; [`TaskConfig::to_spec`] checks that the
/// fields a kind needs are present.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub kind: ConfigTaskKind,

    /// Dependency list: this task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,

    /// Target table (stage / load_fact / load_dimension).
    #[serde(default)]
    pub table: Option<String>,

    /// Inline SQL script (statement).
    #[serde(default)]
    pub sql: Option<String>,

    /// SQL script file, relative to the config file (statement).
    #[serde(default)]
    pub sql_file: Option<String>,

    #[serde(default)]
    pub s3_bucket: Option<String>,

    /// Key or prefix inside `s3_bucket`.
    #[serde(default)]
    pub s3_key: Option<String>,

    /// `"json"` (default) or `"csv"`.
    #[serde(default)]
    pub format: Option<String>,

    /// JSONPaths file; a bare file name is resolved inside `s3_bucket`.
    #[serde(default)]
    pub json_paths: Option<String>,

    #[serde(default)]
    pub csv_delimiter: Option<String>,

    #[serde(default)]
    pub ignore_header: Option<u32>,

    /// Read query whose rows are inserted into `table`.
    #[serde(default)]
    pub load_query: Option<String>,

    /// Defaults to `delete_all` for both fact and dimension loads.
    #[serde(default)]
    pub reset: Option<ResetPolicy>,

    /// Tables to check, in order (quality_check).
    #[serde(default)]
    pub tables: Vec<String>,

    /// Optional per-table assertion queries (quality_check).
    #[serde(default)]
    pub assertions: BTreeMap<String, String>,
}

impl TaskConfig {
    /// A config with only `kind` set.
    pub fn of_kind(kind: ConfigTaskKind) -> Self {
        Self {
            kind,
            after: Vec::new(),
            table: None,
            sql: None,
            sql_file: None,
            s3_bucket: None,
            s3_key: None,
            format: None,
            json_paths: None,
            csv_delimiter: None,
            ignore_header: None,
            load_query: None,
            reset: None,
            tables: Vec::new(),
            assertions: BTreeMap::new(),
        }
    }

    /// Convenience: the reset policy with the load default applied.
    pub fn effective_reset(&self) -> ResetPolicy {
        self.reset.unwrap_or_default()
    }

    /// Convert into an immutable [`TaskSpec`], checking required fields.
    pub fn to_spec(&self, name: &str) -> Result<TaskSpec> {
        let behavior = match self.kind {
            ConfigTaskKind::Begin => return Ok(TaskSpec::begin(name)),
            ConfigTaskKind::End => return Ok(TaskSpec::end(name)),
            ConfigTaskKind::Statement => {
                let sql = match (&self.sql, &self.sql_file) {
                    (Some(sql), _) => sql.clone(),
                    (None, Some(file)) => {
                        return Err(missing(
                            name,
                            &format!("`sql_file = \"{file}\"` was not resolved; load the config from disk"),
                        ));
                    }
                    (None, None) => return Err(missing(name, "`sql` or `sql_file`")),
                };
                TaskBehavior::Statement { sql }
            }
            ConfigTaskKind::Stage => {
                let table = self.required(name, &self.table, "table")?;
                let bucket = self.required(name, &self.s3_bucket, "s3_bucket")?;
                let prefix = self.s3_key.clone().unwrap_or_default();
                let format = self.format_descriptor(name, &bucket)?;
                TaskBehavior::Stage {
                    target_table: table,
                    source: SourceLocation::new(bucket, prefix),
                    format,
                }
            }
            ConfigTaskKind::LoadFact | ConfigTaskKind::LoadDimension => {
                let table = self.required(name, &self.table, "table")?;
                let query = self.required(name, &self.load_query, "load_query")?;
                let load = crate::dag::LoadSpec {
                    target_table: table,
                    load_query: query,
                    reset: self.effective_reset(),
                };
                if self.kind == ConfigTaskKind::LoadFact {
                    TaskBehavior::LoadFact(load)
                } else {
                    TaskBehavior::LoadDimension(load)
                }
            }
            ConfigTaskKind::QualityCheck => {
                if self.tables.is_empty() {
                    return Err(missing(name, "a non-empty `tables` list"));
                }
                if let Some(table) = self.assertions.keys().find(|t| !self.tables.contains(*t)) {
                    return Err(StagedagError::ConfigError(format!(
                        "task '{name}' has an assertion for '{table}', which is not in `tables`"
                    )));
                }
                let mut checks = QualityCheckSpec::new(self.tables.iter().cloned());
                checks.assertions = self.assertions.clone();
                TaskBehavior::QualityCheck(checks)
            }
        };

        Ok(TaskSpec::new(name, behavior))
    }

    fn required(&self, name: &str, field: &Option<String>, label: &str) -> Result<String> {
        match field {
            Some(v) if !v.trim().is_empty() => Ok(v.clone()),
            _ => Err(missing(name, &format!("`{label}`"))),
        }
    }

    fn format_descriptor(&self, name: &str, bucket: &str) -> Result<FormatDescriptor> {
        let format = self
            .format
            .as_deref()
            .map(|f| f.trim().to_lowercase())
            .unwrap_or_else(|| "json".to_string());

        match format.as_str() {
            "json" => Ok(match &self.json_paths {
                Some(path) if path.starts_with("s3://") => FormatDescriptor::JsonPaths(path.clone()),
                Some(path) => FormatDescriptor::JsonPaths(format!(
                    "s3://{}/{}",
                    bucket,
                    path.trim_start_matches('/')
                )),
                None => FormatDescriptor::JsonAuto,
            }),
            "csv" => {
                if self.json_paths.is_some() {
                    return Err(StagedagError::ConfigError(format!(
                        "task '{name}' sets `json_paths` but uses format \"csv\""
                    )));
                }
                let delimiter = match self.csv_delimiter.as_deref() {
                    None => ',',
                    Some(d) => {
                        let mut chars = d.chars();
                        match (chars.next(), chars.next()) {
                            (Some(c), None) => c,
                            _ => {
                                return Err(StagedagError::ConfigError(format!(
                                    "task '{name}': `csv_delimiter` must be a single character (got {d:?})"
                                )));
                            }
                        }
                    }
                };
                Ok(FormatDescriptor::Csv {
                    delimiter,
                    ignore_header: self.ignore_header.unwrap_or(0),
                })
            }
            other => Err(StagedagError::ConfigError(format!(
                "task '{name}': unsupported format \"{other}\" (expected \"json\" or \"csv\")"
            ))),
        }
    }
}

fn missing(name: &str, what: &str) -> StagedagError {
    StagedagError::ConfigError(format!("task '{name}' requires {what}"))
}
