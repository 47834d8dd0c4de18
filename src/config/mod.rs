// src/config/mod.rs

//! Pipeline definition loading and validation for stagedag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate field requirements and graph shape (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, resolve_sql_files};
pub use model::{
    ConfigFile, ConfigSection, ConfigTaskKind, ConnectionConfig, RawConfigFile, TaskConfig,
};
