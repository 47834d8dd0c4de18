// tests/config_loading.rs

use std::error::Error;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tempfile::{NamedTempFile, tempdir};

use stagedag::cli::CliArgs;
use stagedag::config::{ConfigTaskKind, default_config_path, load_and_validate};
use stagedag::dag::{DependencyGraph, FormatDescriptor, TaskBehavior};
use stagedag::engine::EngineConfig;
use stagedag::errors::{GraphError, StagedagError};
use stagedag::types::ResetPolicy;
use stagedag_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};

type TestResult = Result<(), Box<dyn Error>>;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

fn expect_config_error(contents: &str) -> String {
    let file = write_config(contents);
    match load_and_validate(file.path()) {
        Err(StagedagError::ConfigError(msg)) => msg,
        Err(e) => panic!("Expected ConfigError, got: {e:?}"),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

fn shipped_pipeline() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("pipelines/songplays.toml")
}

#[test]
fn shipped_songplays_pipeline_loads() -> TestResult {
    let cfg = load_and_validate(shipped_pipeline())?;
    assert_eq!(cfg.task.len(), 11);

    let engine = EngineConfig::from_config(&cfg)?;
    assert_eq!(engine.owner.as_deref(), Some("gracomot"));
    assert_eq!(engine.max_attempts, 4);
    assert_eq!(engine.retry_delay, Duration::from_secs(300));

    let graph = DependencyGraph::from_config(&cfg)?;
    graph.validate()?;
    let layers = graph.topological_layers()?;
    assert_eq!(layers.len(), 7);
    assert_eq!(layers[2], vec!["Stage_events", "Stage_songs"]);
    assert_eq!(
        layers[4],
        vec![
            "Load_artist_dim_table",
            "Load_song_dim_table",
            "Load_time_dim_table",
            "Load_user_dim_table",
        ]
    );

    // sql_file was inlined relative to the config file.
    match graph.task("Create_tables").map(|t| t.behavior()) {
        Some(TaskBehavior::Statement { sql }) => {
            assert!(sql.contains("CREATE TABLE IF NOT EXISTS public.staging_events"))
        }
        other => panic!("expected statement, got {other:?}"),
    }

    // Bare JSONPaths file names resolve inside the staging bucket.
    match graph.task("Stage_events").map(|t| t.behavior()) {
        Some(TaskBehavior::Stage { format, source, .. }) => {
            assert_eq!(
                format,
                &FormatDescriptor::JsonPaths("s3://gracomot-airflow/log_json_path.json".to_string())
            );
            assert_eq!(source.uri(), "s3://gracomot-airflow/log-data");
        }
        other => panic!("expected stage, got {other:?}"),
    }
    Ok(())
}

#[test]
fn load_tasks_default_to_delete_all() -> TestResult {
    let cfg = ConfigFileBuilder::new()
        .with_task("Begin", TaskConfigBuilder::begin().build())
        .with_task(
            "Load_fact",
            TaskConfigBuilder::load_fact("songplays", "SELECT 1")
                .after("Begin")
                .build(),
        )
        .with_task(
            "Load_users",
            TaskConfigBuilder::load_dimension("users", "SELECT 1")
                .after("Load_fact")
                .reset(ResetPolicy::None)
                .build(),
        )
        .build();

    let graph = DependencyGraph::from_config(&cfg)?;
    match graph.task("Load_fact").map(|t| t.behavior()) {
        Some(TaskBehavior::LoadFact(load)) => assert_eq!(load.reset, ResetPolicy::DeleteAll),
        other => panic!("expected fact load, got {other:?}"),
    }
    match graph.task("Load_users").map(|t| t.behavior()) {
        Some(TaskBehavior::LoadDimension(load)) => assert_eq!(load.reset, ResetPolicy::None),
        other => panic!("expected dimension load, got {other:?}"),
    }
    Ok(())
}

#[test]
fn reset_accepts_append_and_truncate_spellings() -> TestResult {
    let file = write_config(
        r#"
[task.Begin]
kind = "begin"

[task.Load_fact]
kind = "load_fact"
after = ["Begin"]
table = "songplays"
load_query = "SELECT 1"
reset = "append"

[task.Load_users]
kind = "load_dimension"
after = ["Load_fact"]
table = "users"
load_query = "SELECT 1"
reset = "truncate"

[task.Load_songs]
kind = "load_dimension"
after = ["Load_fact"]
table = "songs"
load_query = "SELECT 1"
reset = "delete"
"#,
    );

    let cfg = load_and_validate(file.path())?;
    assert_eq!(cfg.task["Load_fact"].reset, Some(ResetPolicy::None));
    assert_eq!(cfg.task["Load_users"].reset, Some(ResetPolicy::DeleteAll));
    assert_eq!(cfg.task["Load_songs"].reset, Some(ResetPolicy::DeleteAll));
    Ok(())
}

#[test]
fn unknown_reset_policy_is_a_toml_error() {
    let file = write_config(
        r#"
[task.Begin]
kind = "begin"

[task.Load_fact]
kind = "load_fact"
after = ["Begin"]
table = "songplays"
load_query = "SELECT 1"
reset = "sometimes"
"#,
    );
    assert!(matches!(
        load_and_validate(file.path()),
        Err(StagedagError::TomlError(_))
    ));
}

#[test]
fn cli_defaults_to_stagedag_toml() -> TestResult {
    let args = CliArgs::try_parse_from(["stagedag"])?;
    assert_eq!(args.config, default_config_path());
    assert_eq!(args.config, PathBuf::from("Stagedag.toml"));
    assert!(!args.dry_run);

    let args = CliArgs::try_parse_from(["stagedag", "--config", "pipelines/songplays.toml", "--dry-run"])?;
    assert_eq!(args.config, PathBuf::from("pipelines/songplays.toml"));
    assert!(args.dry_run);
    Ok(())
}

#[test]
fn csv_stage_with_custom_delimiter() -> TestResult {
    let cfg = ConfigFileBuilder::new()
        .with_task("Begin", TaskConfigBuilder::begin().build())
        .with_task(
            "Stage_users",
            TaskConfigBuilder::stage("staging_users", "bucket", "users.csv")
                .csv(";", 1)
                .after("Begin")
                .build(),
        )
        .build();

    let graph = DependencyGraph::from_config(&cfg)?;
    match graph.task("Stage_users").map(|t| t.behavior()) {
        Some(TaskBehavior::Stage { format, .. }) => assert_eq!(
            format,
            &FormatDescriptor::Csv {
                delimiter: ';',
                ignore_header: 1
            }
        ),
        other => panic!("expected stage, got {other:?}"),
    }
    Ok(())
}

#[test]
fn sql_file_is_resolved_next_to_the_config() -> TestResult {
    let dir = tempdir()?;
    fs::create_dir_all(dir.path().join("sql"))?;
    fs::write(dir.path().join("sql/schema.sql"), "CREATE TABLE t (id int);")?;
    let config_path = dir.path().join("Stagedag.toml");
    fs::write(
        &config_path,
        r#"
[task.Begin]
kind = "begin"

[task.Schema]
kind = "statement"
after = ["Begin"]
sql_file = "sql/schema.sql"
"#,
    )?;

    let cfg = load_and_validate(&config_path)?;
    assert_eq!(
        cfg.task["Schema"].sql.as_deref(),
        Some("CREATE TABLE t (id int);")
    );
    assert_eq!(cfg.task["Schema"].kind, ConfigTaskKind::Statement);
    Ok(())
}

#[test]
fn missing_sql_file_is_a_config_error() {
    let msg = expect_config_error(
        r#"
[task.Begin]
kind = "begin"

[task.Schema]
kind = "statement"
after = ["Begin"]
sql_file = "does-not-exist.sql"
"#,
    );
    assert!(msg.contains("cannot read sql_file"), "message: {msg}");
}

#[test]
fn dependency_cycle_returns_graph_error() {
    let file = write_config(
        r#"
[task.Begin]
kind = "begin"

[task.A]
kind = "statement"
sql = "SELECT 1"
after = ["Begin", "B"]

[task.B]
kind = "statement"
sql = "SELECT 1"
after = ["A"]
"#,
    );

    match load_and_validate(file.path()) {
        Err(StagedagError::Graph(GraphError::Cycle(task))) => {
            assert!(task == "A" || task == "B")
        }
        Err(e) => panic!("Expected Cycle error, got: {e:?}"),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn unknown_dependency_returns_config_error() {
    let msg = expect_config_error(
        r#"
[task.Begin]
kind = "begin"

[task.A]
kind = "statement"
sql = "SELECT 1"
after = ["NonExistent"]
"#,
    );
    assert!(msg.contains("unknown dependency 'NonExistent'"), "message: {msg}");
}

#[test]
fn stage_without_table_returns_config_error() {
    let msg = expect_config_error(
        r#"
[task.Begin]
kind = "begin"

[task.Stage_songs]
kind = "stage"
after = ["Begin"]
s3_bucket = "gracomot-airflow"
s3_key = "song-data"
"#,
    );
    assert!(msg.contains("Stage_songs"), "message: {msg}");
    assert!(msg.contains("`table`"), "message: {msg}");
}

#[test]
fn quality_check_needs_tables() {
    let msg = expect_config_error(
        r#"
[task.Begin]
kind = "begin"

[task.Check]
kind = "quality_check"
after = ["Begin"]
"#,
    );
    assert!(msg.contains("tables"), "message: {msg}");
}

#[test]
fn assertion_for_unchecked_table_is_rejected() {
    let msg = expect_config_error(
        r#"
[task.Begin]
kind = "begin"

[task.Check]
kind = "quality_check"
after = ["Begin"]
tables = ["songs"]

[task.Check.assertions]
users = "SELECT 1"
"#,
    );
    assert!(msg.contains("'users'"), "message: {msg}");
}

#[test]
fn json_paths_with_csv_is_rejected() {
    let msg = expect_config_error(
        r#"
[task.Begin]
kind = "begin"

[task.Stage]
kind = "stage"
after = ["Begin"]
table = "staging"
s3_bucket = "b"
format = "csv"
json_paths = "paths.json"
"#,
    );
    assert!(msg.contains("json_paths"), "message: {msg}");
}

#[test]
fn zero_max_attempts_is_rejected() {
    let msg = expect_config_error(
        r#"
[config]
max_attempts = 0

[task.Begin]
kind = "begin"
"#,
    );
    assert!(msg.contains("max_attempts"), "message: {msg}");
}

#[test]
fn malformed_retry_delay_is_rejected() {
    let msg = expect_config_error(
        r#"
[config]
retry_delay = "5 minutes"

[task.Begin]
kind = "begin"
"#,
    );
    assert!(msg.contains("retry_delay"), "message: {msg}");
}

#[test]
fn empty_config_is_rejected() {
    let msg = expect_config_error("[config]\nowner = \"nobody\"\n");
    assert!(msg.contains("at least one"), "message: {msg}");
}

#[test]
fn unknown_task_kind_is_a_toml_error() {
    let file = write_config(
        r#"
[task.Begin]
kind = "sensor"
"#,
    );
    assert!(matches!(
        load_and_validate(file.path()),
        Err(StagedagError::TomlError(_))
    ));
}
