// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dag::{DependencyGraph, TaskBehavior};
use crate::engine::{EngineConfig, PipelineEngine};
use crate::exec::{ShellStatementExecutor, StatementExecutor};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and graph validation
/// - the shell executor for the configured SQL client
/// - the pipeline engine
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.config.clone();
    let cfg = load_and_validate(&config_path)?;
    let graph = DependencyGraph::from_config(&cfg)?;

    if args.dry_run {
        print_dry_run(&cfg, &graph)?;
        return Ok(());
    }

    let executor: Arc<dyn StatementExecutor> =
        Arc::new(ShellStatementExecutor::new(&cfg.connection));
    let engine = PipelineEngine::new(EngineConfig::from_config(&cfg)?);

    // Ctrl-C → stop dispatching; in-flight statements finish.
    {
        let cancel = engine.cancel_handle();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            warn!("Ctrl-C received; cancelling after in-flight tasks finish");
            cancel.cancel();
        });
    }

    info!(config = %config_path.display(), "running pipeline");

    match engine.run(&graph, executor).await {
        Ok(report) => {
            println!("{report}");
            Ok(())
        }
        Err(err) => {
            if let Some(report) = err.report() {
                println!("{report}");
            }
            Err(err.into())
        }
    }
}

/// Dry-run output: execution layers and what each task would do.
fn print_dry_run(cfg: &ConfigFile, graph: &DependencyGraph) -> Result<()> {
    let layers = graph.topological_layers()?;

    println!("stagedag dry-run");
    if let Some(ref owner) = cfg.config.owner {
        println!("  config.owner = {owner}");
    }
    println!("  config.max_attempts = {}", cfg.config.max_attempts);
    println!("  config.retry_delay = {}", cfg.config.retry_delay);
    println!("  connection.program = {}", cfg.connection.program);
    println!();

    println!("layers ({}):", layers.len());
    for (depth, layer) in layers.iter().enumerate() {
        println!("  [{depth}]");
        for name in layer {
            let Some(spec) = graph.task(name) else {
                continue;
            };
            println!("    - {name} ({})", spec.kind());
            match spec.behavior() {
                TaskBehavior::Sentinel(_) => {}
                TaskBehavior::Statement { sql } => {
                    println!("        statements: {}", sql.matches(';').count().max(1));
                }
                TaskBehavior::Stage {
                    target_table,
                    source,
                    ..
                } => {
                    println!("        copy: {source} -> {target_table}");
                }
                TaskBehavior::LoadFact(load) | TaskBehavior::LoadDimension(load) => {
                    println!("        insert into: {} (reset: {:?})", load.target_table, load.reset);
                }
                TaskBehavior::QualityCheck(checks) => {
                    println!("        tables: {:?}", checks.tables);
                }
            }
            let deps = graph.dependencies_of(name);
            if !deps.is_empty() {
                println!("        after: {:?}", deps);
            }
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
