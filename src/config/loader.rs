// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, StagedagError};

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (graph correctness, etc.). Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Inlines `sql_file` scripts, resolved relative to the config file.
/// - Checks for:
///   - unknown `after` references,
///   - missing per-kind fields,
///   - cycles, unreachable tasks and misplaced sentinels,
///   - basic global config sanity.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let mut raw_config = load_from_path(path)?;
    resolve_sql_files(&mut raw_config, &config_root_dir(path))?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Read every `sql_file` into the task's `sql` field.
///
/// An inline `sql` wins over `sql_file` when both are given.
pub fn resolve_sql_files(cfg: &mut RawConfigFile, base_dir: &Path) -> Result<()> {
    for (name, task) in cfg.task.iter_mut() {
        if task.sql.is_some() {
            continue;
        }
        let Some(ref file) = task.sql_file else {
            continue;
        };

        let path = base_dir.join(file);
        debug!(task = %name, path = %path.display(), "reading sql_file");
        let sql = fs::read_to_string(&path).map_err(|e| {
            StagedagError::ConfigError(format!(
                "task '{}': cannot read sql_file '{}': {}",
                name,
                path.display(),
                e
            ))
        })?;
        task.sql = Some(sql);
    }
    Ok(())
}

/// Helper to resolve a default config path.
///
/// Currently this just returns `Stagedag.toml` in the current working
/// directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Stagedag.toml")
}

/// Directory that relative paths in the config are resolved against.
///
/// - If the config path has a non-empty parent (e.g. "pipelines/songplays.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Stagedag.toml" (parent = ""),
///   we fall back to the current working directory "."
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
