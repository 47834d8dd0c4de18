// src/engine/pipeline.rs

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::dag::{DependencyGraph, TaskSpec};
use crate::engine::state::RunState;
use crate::engine::report::RunReport;
use crate::engine::{CancelHandle, EngineConfig, TaskName, TaskOutcome};
use crate::errors::PipelineError;
use crate::exec::{StatementExecutor, TaskRunner};

/// Drives a [`DependencyGraph`] to completion, one topological layer at a
/// time.
///
/// - Every task of a layer is spawned onto a `JoinSet` and runs concurrently.
/// - The next layer starts only after every task of the current layer reached
///   a terminal state (layer barrier).
/// - If any task of a layer failed, no further layer is dispatched.
///
/// The engine owns all per-run state; the runner and executor are stateless
/// with respect to the run.
#[derive(Debug, Default)]
pub struct PipelineEngine {
    config: EngineConfig,
    cancel: CancelHandle,
}

impl PipelineEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            cancel: CancelHandle::default(),
        }
    }

    /// Handle that stops the engine from dispatching further work.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Run the whole graph once.
    ///
    /// Structural errors are returned before any task is dispatched. Each call
    /// starts from a fresh set of task states.
    pub async fn run(
        &self,
        graph: &DependencyGraph,
        executor: Arc<dyn StatementExecutor>,
    ) -> Result<RunReport, PipelineError> {
        graph.validate()?;
        let layers = graph.topological_layers()?;

        let started = Instant::now();
        let mut state = RunState::new(graph, &layers);

        info!(
            owner = self.config.owner.as_deref().unwrap_or("-"),
            tasks = graph.len(),
            layers = layers.len(),
            max_attempts = self.config.max_attempts,
            "starting pipeline run"
        );

        for (depth, layer) in layers.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(layer = depth, "run cancelled; not dispatching remaining layers");
                return Err(PipelineError::Cancelled {
                    report: state.to_report(started.elapsed()),
                });
            }

            self.run_layer(depth, layer, graph, &executor, &mut state)
                .await;

            let failed = state.failed_tasks();
            if !failed.is_empty() {
                error!(
                    layer = depth,
                    failed = ?failed,
                    "layer failed; halting pipeline"
                );
                return Err(PipelineError::TasksFailed {
                    failed_tasks: failed,
                    report: state.to_report(started.elapsed()),
                });
            }
        }

        let report = state.to_report(started.elapsed());
        info!(
            tasks = report.tasks.len(),
            duration = ?report.duration,
            "pipeline run succeeded"
        );
        Ok(report)
    }

    /// Dispatch every task of one layer and wait for all of them.
    ///
    /// Already-running tasks are always drained, even when a sibling fails.
    async fn run_layer(
        &self,
        depth: usize,
        layer: &[TaskName],
        graph: &DependencyGraph,
        executor: &Arc<dyn StatementExecutor>,
        state: &mut RunState,
    ) {
        debug!(layer = depth, tasks = ?layer, "dispatching layer");

        let mut set = JoinSet::new();

        for name in layer {
            let Some(spec) = graph.task(name).cloned() else {
                warn!(task = %name, "layer references unknown task; skipping");
                continue;
            };

            state.mark_running(name);

            let executor = Arc::clone(executor);
            let config = self.config.clone();
            let cancel = self.cancel.clone();
            set.spawn(async move {
                let outcome = execute_with_retry(&spec, executor.as_ref(), &config, &cancel).await;
                (spec.name().to_string(), outcome)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((name, outcome)) => state.record_outcome(&name, outcome),
                Err(join_err) => {
                    error!(layer = depth, error = %join_err, "task worker aborted");
                }
            }
        }

        // A worker that panicked never reported back.
        state.fail_unfinished(layer, "worker exited without reporting an outcome");

        debug!(layer = depth, "layer drained");
    }
}

/// Run one task, retrying retryable failures up to `max_attempts` with a
/// fixed delay in between. No new attempt starts once the run is cancelled,
/// and a cancel during the delay ends the wait early with the last error.
async fn execute_with_retry(
    spec: &TaskSpec,
    executor: &dyn StatementExecutor,
    config: &EngineConfig,
    cancel: &CancelHandle,
) -> TaskOutcome {
    let started = Instant::now();
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        debug!(task = %spec.name(), attempt, "starting attempt");

        match TaskRunner::execute(spec, executor).await {
            Ok(()) => {
                info!(task = %spec.name(), attempt, "task succeeded");
                return TaskOutcome {
                    attempts: attempt,
                    duration: started.elapsed(),
                    result: Ok(()),
                };
            }
            Err(e) if e.is_retryable() && attempt < max_attempts && !cancel.is_cancelled() => {
                warn!(
                    task = %spec.name(),
                    attempt,
                    max_attempts,
                    error = %e,
                    delay = ?config.retry_delay,
                    "task attempt failed; retrying"
                );
                tokio::select! {
                    _ = tokio::time::sleep(config.retry_delay) => {}
                    _ = cancel.cancelled() => {}
                }
                if cancel.is_cancelled() {
                    warn!(task = %spec.name(), attempt, "run cancelled during retry backoff");
                    return TaskOutcome {
                        attempts: attempt,
                        duration: started.elapsed(),
                        result: Err(e),
                    };
                }
            }
            Err(e) => {
                error!(task = %spec.name(), attempt, error = %e, "task failed");
                return TaskOutcome {
                    attempts: attempt,
                    duration: started.elapsed(),
                    result: Err(e),
                };
            }
        }
    }
}
