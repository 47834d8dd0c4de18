// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::dag::DependencyGraph;
use crate::errors::{Result, StagedagError};
use crate::types::parse_duration;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::StagedagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.connection, raw.task))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_graph(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(StagedagError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.max_attempts == 0 {
        return Err(StagedagError::ConfigError(
            "[config].max_attempts must be >= 1 (got 0)".to_string(),
        ));
    }

    parse_duration(&cfg.config.retry_delay)
        .map_err(|e| StagedagError::ConfigError(format!("[config].retry_delay: {e}")))?;

    if cfg.connection.program.trim().is_empty() {
        return Err(StagedagError::ConfigError(
            "[connection].program must not be empty".to_string(),
        ));
    }

    if cfg.connection.field_separator.is_empty() {
        return Err(StagedagError::ConfigError(
            "[connection].field_separator must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if !cfg.task.contains_key(dep) {
                return Err(StagedagError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(StagedagError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
        }
    }
    Ok(())
}

/// Build the task graph (which also checks per-kind fields) and validate its
/// shape: acyclic, single Begin, everything reachable.
fn validate_graph(cfg: &RawConfigFile) -> Result<()> {
    let graph = DependencyGraph::from_tasks(&cfg.task)?;
    graph.validate()?;
    Ok(())
}
