// tests/pipeline_engine.rs

use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};

use stagedag::dag::{DependencyGraph, FormatDescriptor, SourceLocation, TaskSpec};
use stagedag::engine::{EngineConfig, PipelineEngine, TaskStatus};
use stagedag::errors::{ExecutionError, GraphError, PipelineError};
use stagedag::types::ResetPolicy;
use stagedag_test_utils::builders::*;
use stagedag_test_utils::{init_tracing, statement_error, with_timeout, ExecutorCall, FakeExecutor};

type TestResult = Result<(), Box<dyn Error>>;

fn retrying(max_attempts: u32) -> EngineConfig {
    EngineConfig {
        owner: Some("tests".to_string()),
        max_attempts,
        retry_delay: Duration::from_millis(5),
    }
}

/// Begin -> Load (append-only fact load).
fn single_load_graph() -> DependencyGraph {
    let mut g = DependencyGraph::new();
    g.add_task(TaskSpec::begin("Begin")).unwrap();
    g.add_task(TaskSpec::load_fact(
        "Load",
        "songplays",
        "SELECT * FROM staging_events",
        ResetPolicy::None,
    ))
    .unwrap();
    g.add_edge("Begin", "Load").unwrap();
    g
}

#[tokio::test]
async fn failing_check_halts_before_end() -> TestResult {
    init_tracing();
    let graph = linear_graph(&["songplays", "users"]);
    let executor = Arc::new(FakeExecutor::new().with_row_count("users", 0));
    let engine = PipelineEngine::default();

    let err = with_timeout(engine.run(&graph, executor.clone()))
        .await
        .expect_err("check must fail the run");

    let (failed_tasks, report) = match err {
        PipelineError::TasksFailed {
            failed_tasks,
            report,
        } => (failed_tasks, report),
        other => panic!("expected TasksFailed, got {other:?}"),
    };
    assert_eq!(failed_tasks, vec!["Check".to_string()]);

    assert_eq!(report.status_of("Begin"), Some(TaskStatus::Succeeded));
    assert_eq!(report.status_of("Stage"), Some(TaskStatus::Succeeded));
    assert_eq!(report.status_of("Load"), Some(TaskStatus::Succeeded));
    assert_eq!(report.status_of("Check"), Some(TaskStatus::Failed));
    assert_eq!(report.status_of("End"), Some(TaskStatus::Pending));

    let end = report.task("End").unwrap();
    assert_eq!(end.attempts, 0);

    let check = report.task("Check").unwrap();
    let msg = check.error.as_deref().unwrap_or_default();
    assert!(msg.contains("users"), "error: {msg}");
    assert!(!msg.contains("songplays"), "error: {msg}");
    Ok(())
}

#[tokio::test]
async fn execution_errors_are_retried_until_success() -> TestResult {
    init_tracing();
    let graph = single_load_graph();
    let executor = Arc::new(FakeExecutor::new().fail_times(
        "INSERT INTO songplays",
        2,
        statement_error("INSERT"),
    ));
    let engine = PipelineEngine::new(retrying(3));

    let report = with_timeout(engine.run(&graph, executor.clone())).await?;

    let load = report.task("Load").unwrap();
    assert_eq!(load.status, TaskStatus::Succeeded);
    assert_eq!(load.attempts, 3);
    assert!(load.error.is_none());
    assert_eq!(executor.calls().len(), 3);
    Ok(())
}

#[tokio::test]
async fn retries_stop_at_max_attempts() -> TestResult {
    init_tracing();
    let graph = single_load_graph();
    let executor = Arc::new(
        FakeExecutor::new().fail_matching("INSERT INTO songplays", statement_error("INSERT")),
    );
    let engine = PipelineEngine::new(retrying(2));

    let err = with_timeout(engine.run(&graph, executor.clone()))
        .await
        .expect_err("load never succeeds");

    let report = err.report().expect("report for failed run");
    let load = report.task("Load").unwrap();
    assert_eq!(load.status, TaskStatus::Failed);
    assert_eq!(load.attempts, 2);
    assert_eq!(executor.calls().len(), 2);
    Ok(())
}

#[tokio::test]
async fn missing_source_is_not_retried() -> TestResult {
    init_tracing();
    let mut graph = DependencyGraph::new();
    graph.add_task(TaskSpec::begin("Begin"))?;
    graph.add_task(TaskSpec::stage(
        "Stage_songs",
        "staging_songs",
        SourceLocation::new("gracomot-airflow", "song-data"),
        FormatDescriptor::JsonAuto,
    ))?;
    graph.add_edge("Begin", "Stage_songs")?;

    let executor =
        Arc::new(FakeExecutor::new().with_missing_source("s3://gracomot-airflow/song-data"));
    let engine = PipelineEngine::new(retrying(3));

    let err = with_timeout(engine.run(&graph, executor.clone()))
        .await
        .expect_err("source is missing");

    let stage = err.report().unwrap().task("Stage_songs").unwrap().clone();
    assert_eq!(stage.status, TaskStatus::Failed);
    assert_eq!(stage.attempts, 1);
    assert!(stage.error.unwrap().contains("s3://gracomot-airflow/song-data"));
    Ok(())
}

#[tokio::test]
async fn failed_quality_check_is_not_retried() -> TestResult {
    init_tracing();
    let graph = linear_graph(&["users"]);
    let executor = Arc::new(FakeExecutor::new().with_row_count("users", 0));
    let engine = PipelineEngine::new(retrying(4));

    let err = with_timeout(engine.run(&graph, executor.clone()))
        .await
        .expect_err("users is empty");

    let check = err.report().unwrap().task("Check").unwrap().clone();
    assert_eq!(check.attempts, 1);
    let counts = executor
        .calls()
        .into_iter()
        .filter(|c| matches!(c, ExecutorCall::Query(_)))
        .count();
    assert_eq!(counts, 1);
    Ok(())
}

#[tokio::test]
async fn repeated_runs_report_identical_statuses() -> TestResult {
    init_tracing();
    let graph = songplays_graph();
    let executor = Arc::new(FakeExecutor::new());
    let engine = PipelineEngine::default();

    let first = with_timeout(engine.run(&graph, executor.clone())).await?;
    let second = with_timeout(engine.run(&graph, executor.clone())).await?;

    assert!(first.is_success());
    assert_eq!(first.statuses(), second.statuses());
    assert_eq!(first.tasks.len(), graph.len());
    assert!(second.tasks.iter().all(|t| t.attempts == 1));
    Ok(())
}

#[tokio::test]
async fn fact_load_waits_for_both_staging_copies() -> TestResult {
    init_tracing();
    let graph = songplays_graph();
    let executor = Arc::new(FakeExecutor::new().with_latency(Duration::from_millis(20)));
    let engine = PipelineEngine::default();

    with_timeout(engine.run(&graph, executor.clone())).await?;

    let log = executor.sql_log();
    let position = |prefix: &str| {
        log.iter()
            .position(|sql| sql.starts_with(prefix))
            .unwrap_or_else(|| panic!("no call starting with {prefix}: {log:?}"))
    };

    let fact_delete = position("DELETE FROM songplays");
    assert!(position("COPY staging_events") < fact_delete);
    assert!(position("COPY staging_songs") < fact_delete);
    assert!(position("CREATE TABLE") < position("COPY staging_events"));

    // Dimension loads run only after the fact insert, and checks after every dimension.
    let fact_insert = position("INSERT INTO songplays");
    let first_count = position("SELECT COUNT(*)");
    for table in ["users", "songs", "artists", "time"] {
        let insert = position(&format!("INSERT INTO {table} "));
        assert!(fact_insert < position(&format!("DELETE FROM {table}")));
        assert!(insert < first_count);
    }

    // Siblings in a layer overlap.
    assert!(executor.max_in_flight() >= 2, "max in flight: {}", executor.max_in_flight());
    Ok(())
}

#[tokio::test]
async fn failure_drains_siblings_and_skips_later_layers() -> TestResult {
    init_tracing();
    let graph = songplays_graph();
    let executor = Arc::new(
        FakeExecutor::new()
            .with_latency(Duration::from_millis(10))
            .fail_matching("COPY staging_events", statement_error("COPY")),
    );
    let engine = PipelineEngine::default();

    let err = with_timeout(engine.run(&graph, executor.clone()))
        .await
        .expect_err("staging events fails");

    let (failed_tasks, report) = match err {
        PipelineError::TasksFailed {
            failed_tasks,
            report,
        } => (failed_tasks, report),
        other => panic!("expected TasksFailed, got {other:?}"),
    };
    assert_eq!(failed_tasks, vec![STAGE_EVENTS.to_string()]);
    assert_eq!(report.status_of(STAGE_SONGS), Some(TaskStatus::Succeeded));
    assert_eq!(report.status_of(LOAD_SONGPLAYS), Some(TaskStatus::Pending));
    for dim in DIMENSION_LOADS {
        assert_eq!(report.status_of(dim), Some(TaskStatus::Pending));
    }
    assert!(
        !executor
            .sql_log()
            .iter()
            .any(|sql| sql.contains("songplays") && !sql.starts_with("CREATE"))
    );
    Ok(())
}

#[tokio::test]
async fn cancel_lets_the_current_layer_finish() -> TestResult {
    init_tracing();
    let graph = songplays_graph();
    let engine = PipelineEngine::default();
    let cancel = engine.cancel_handle();
    let executor = Arc::new(FakeExecutor::new().on_call(move |call| {
        if matches!(call, ExecutorCall::BulkLoad { table, .. } if table == "staging_events") {
            cancel.cancel();
        }
    }));

    let err = with_timeout(engine.run(&graph, executor.clone()))
        .await
        .expect_err("run was cancelled");

    let report = match err {
        PipelineError::Cancelled { report } => report,
        other => panic!("expected Cancelled, got {other:?}"),
    };
    assert_eq!(report.status_of(STAGE_EVENTS), Some(TaskStatus::Succeeded));
    assert_eq!(report.status_of(STAGE_SONGS), Some(TaskStatus::Succeeded));
    assert_eq!(report.status_of(LOAD_SONGPLAYS), Some(TaskStatus::Pending));
    assert!(engine.cancel_handle().is_cancelled());
    Ok(())
}

#[tokio::test]
async fn cancel_during_backoff_skips_the_next_attempt() -> TestResult {
    init_tracing();
    let graph = single_load_graph();
    let executor = Arc::new(FakeExecutor::new().fail_matching(
        "INSERT INTO songplays",
        ExecutionError::Transport("connection reset".to_string()),
    ));
    let engine = PipelineEngine::new(EngineConfig {
        owner: None,
        max_attempts: 3,
        retry_delay: Duration::from_secs(30),
    });
    let cancel = engine.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });

    let started = Instant::now();
    let err = with_timeout(engine.run(&graph, executor.clone()))
        .await
        .expect_err("load never succeeds");
    assert!(started.elapsed() < Duration::from_secs(2), "waited out the backoff");

    let report = match err {
        PipelineError::TasksFailed { report, .. } | PipelineError::Cancelled { report } => report,
        other => panic!("expected a failed or cancelled run, got {other:?}"),
    };
    let load = report.task("Load").unwrap();
    assert_eq!(load.status, TaskStatus::Failed);
    assert_eq!(load.attempts, 1);
    assert!(load.error.as_deref().unwrap_or_default().contains("connection reset"));
    assert_eq!(executor.calls().len(), 1);
    Ok(())
}

#[tokio::test]
async fn invalid_graph_never_dispatches() -> TestResult {
    init_tracing();
    let mut graph = DependencyGraph::new();
    graph.add_task(TaskSpec::begin("Begin"))?;
    graph.add_task(TaskSpec::statement("A", "SELECT 1"))?;
    graph.add_task(TaskSpec::statement("B", "SELECT 1"))?;
    graph.add_edge("Begin", "A")?;
    graph.add_edge("A", "B")?;
    graph.add_edge("B", "A")?;

    let executor = Arc::new(FakeExecutor::new());
    let err = PipelineEngine::default()
        .run(&graph, executor.clone())
        .await
        .expect_err("cycle");

    assert!(matches!(err, PipelineError::Graph(GraphError::Cycle(_))));
    assert!(err.report().is_none());
    assert!(executor.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn report_renders_every_task() -> TestResult {
    init_tracing();
    let graph = linear_graph(&["songplays"]);
    let report = PipelineEngine::default()
        .run(&graph, Arc::new(FakeExecutor::new()))
        .await?;

    let rendered = report.to_string();
    assert!(rendered.starts_with("TASK"));
    for name in ["Begin", "Stage", "Load", "Check", "End"] {
        assert!(rendered.contains(name), "missing {name}: {rendered}");
    }
    assert!(rendered.contains("Succeeded"));
    Ok(())
}
