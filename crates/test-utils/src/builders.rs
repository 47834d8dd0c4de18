#![allow(dead_code)]

use std::collections::BTreeMap;

use stagedag::config::{
    ConfigFile, ConfigSection, ConfigTaskKind, ConnectionConfig, RawConfigFile, TaskConfig,
};
use stagedag::dag::{DependencyGraph, FormatDescriptor, SourceLocation, TaskSpec};
use stagedag::types::ResetPolicy;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                connection: ConnectionConfig::default(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.config.config.max_attempts = attempts;
        self
    }

    pub fn with_retry_delay(mut self, delay: &str) -> Self {
        self.config.config.retry_delay = delay.to_string();
        self
    }

    pub fn with_owner(mut self, owner: &str) -> Self {
        self.config.config.owner = Some(owner.to_string());
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(kind: ConfigTaskKind) -> Self {
        Self {
            task: TaskConfig::of_kind(kind),
        }
    }

    pub fn begin() -> Self {
        Self::new(ConfigTaskKind::Begin)
    }

    pub fn end() -> Self {
        Self::new(ConfigTaskKind::End)
    }

    pub fn statement(sql: &str) -> Self {
        Self::new(ConfigTaskKind::Statement).sql(sql)
    }

    pub fn stage(table: &str, bucket: &str, key: &str) -> Self {
        let mut b = Self::new(ConfigTaskKind::Stage).table(table);
        b.task.s3_bucket = Some(bucket.to_string());
        b.task.s3_key = Some(key.to_string());
        b
    }

    pub fn load_fact(table: &str, query: &str) -> Self {
        Self::new(ConfigTaskKind::LoadFact).table(table).load_query(query)
    }

    pub fn load_dimension(table: &str, query: &str) -> Self {
        Self::new(ConfigTaskKind::LoadDimension)
            .table(table)
            .load_query(query)
    }

    pub fn quality_check(tables: &[&str]) -> Self {
        let mut b = Self::new(ConfigTaskKind::QualityCheck);
        b.task.tables = tables.iter().map(|t| t.to_string()).collect();
        b
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn table(mut self, table: &str) -> Self {
        self.task.table = Some(table.to_string());
        self
    }

    pub fn sql(mut self, sql: &str) -> Self {
        self.task.sql = Some(sql.to_string());
        self
    }

    pub fn sql_file(mut self, path: &str) -> Self {
        self.task.sql_file = Some(path.to_string());
        self
    }

    pub fn load_query(mut self, query: &str) -> Self {
        self.task.load_query = Some(query.to_string());
        self
    }

    pub fn reset(mut self, reset: ResetPolicy) -> Self {
        self.task.reset = Some(reset);
        self
    }

    pub fn json_paths(mut self, path: &str) -> Self {
        self.task.json_paths = Some(path.to_string());
        self
    }

    pub fn csv(mut self, delimiter: &str, ignore_header: u32) -> Self {
        self.task.format = Some("csv".to_string());
        self.task.csv_delimiter = Some(delimiter.to_string());
        self.task.ignore_header = Some(ignore_header);
        self
    }

    pub fn assertion(mut self, table: &str, sql: &str) -> Self {
        self.task.assertions.insert(table.to_string(), sql.to_string());
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

pub const BEGIN: &str = "Begin_execution";
pub const CREATE_TABLES: &str = "Create_tables";
pub const STAGE_EVENTS: &str = "Stage_events";
pub const STAGE_SONGS: &str = "Stage_songs";
pub const LOAD_SONGPLAYS: &str = "Load_songplays_fact_table";
pub const LOAD_USERS: &str = "Load_user_dim_table";
pub const LOAD_SONGS: &str = "Load_song_dim_table";
pub const LOAD_ARTISTS: &str = "Load_artist_dim_table";
pub const LOAD_TIME: &str = "Load_time_dim_table";
pub const QUALITY_CHECKS: &str = "Run_data_quality_checks";
pub const END: &str = "End_execution";

pub const DIMENSION_LOADS: [&str; 4] = [LOAD_USERS, LOAD_SONGS, LOAD_ARTISTS, LOAD_TIME];

/// The full song-play warehouse load:
///
/// `Begin -> Create_tables -> {Stage_events, Stage_songs} -> Load_songplays
///  -> {users, songs, artists, time} -> Run_data_quality_checks -> End`
pub fn songplays_graph() -> DependencyGraph {
    let mut g = DependencyGraph::new();

    g.add_task(TaskSpec::begin(BEGIN)).unwrap();
    g.add_task(TaskSpec::statement(
        CREATE_TABLES,
        "CREATE TABLE IF NOT EXISTS songplays (playid varchar(32) NOT NULL);",
    ))
    .unwrap();
    g.add_task(TaskSpec::stage(
        STAGE_EVENTS,
        "staging_events",
        SourceLocation::new("gracomot-airflow", "log-data"),
        FormatDescriptor::JsonPaths("s3://gracomot-airflow/log_json_path.json".to_string()),
    ))
    .unwrap();
    g.add_task(TaskSpec::stage(
        STAGE_SONGS,
        "staging_songs",
        SourceLocation::new("gracomot-airflow", "song-data"),
        FormatDescriptor::JsonAuto,
    ))
    .unwrap();
    g.add_task(TaskSpec::load_fact(
        LOAD_SONGPLAYS,
        "songplays",
        "SELECT md5(events.sessionid || events.start_time) playid FROM staging_events events",
        ResetPolicy::DeleteAll,
    ))
    .unwrap();
    for (name, table) in DIMENSION_LOADS
        .iter()
        .zip(["users", "songs", "artists", "time"])
    {
        g.add_task(TaskSpec::load_dimension(
            *name,
            table,
            format!("SELECT DISTINCT * FROM staging_{table}"),
            ResetPolicy::DeleteAll,
        ))
        .unwrap();
    }
    g.add_task(TaskSpec::quality_check(
        QUALITY_CHECKS,
        ["songplays", "users", "songs", "artists", "time"],
    ))
    .unwrap();
    g.add_task(TaskSpec::end(END)).unwrap();

    g.add_edge(BEGIN, CREATE_TABLES).unwrap();
    g.add_edge(CREATE_TABLES, STAGE_EVENTS).unwrap();
    g.add_edge(CREATE_TABLES, STAGE_SONGS).unwrap();
    g.add_edge(STAGE_EVENTS, LOAD_SONGPLAYS).unwrap();
    g.add_edge(STAGE_SONGS, LOAD_SONGPLAYS).unwrap();
    for dim in DIMENSION_LOADS {
        g.add_edge(LOAD_SONGPLAYS, dim).unwrap();
        g.add_edge(dim, QUALITY_CHECKS).unwrap();
    }
    g.add_edge(QUALITY_CHECKS, END).unwrap();

    g
}

/// `Begin -> Stage -> Load -> Check -> End`, checking `check_tables`.
pub fn linear_graph(check_tables: &[&str]) -> DependencyGraph {
    let mut g = DependencyGraph::new();
    g.add_task(TaskSpec::begin("Begin")).unwrap();
    g.add_task(TaskSpec::stage(
        "Stage",
        "staging_events",
        SourceLocation::new("bucket", "log-data"),
        FormatDescriptor::JsonAuto,
    ))
    .unwrap();
    g.add_task(TaskSpec::load_fact(
        "Load",
        "songplays",
        "SELECT * FROM staging_events",
        ResetPolicy::DeleteAll,
    ))
    .unwrap();
    g.add_task(TaskSpec::quality_check("Check", check_tables.iter().copied()))
        .unwrap();
    g.add_task(TaskSpec::end("End")).unwrap();

    g.add_edge("Begin", "Stage").unwrap();
    g.add_edge("Stage", "Load").unwrap();
    g.add_edge("Load", "Check").unwrap();
    g.add_edge("Check", "End").unwrap();
    g
}
