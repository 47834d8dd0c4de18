// src/engine/state.rs

//! Per-run task state.
//!
//! [`RunState`] is created fresh for every run and is only touched by the
//! engine. It has no channels and performs no IO, so the transition rules can
//! be exercised without tokio.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, warn};

use crate::dag::DependencyGraph;
use crate::engine::report::{RunReport, TaskReport};
use crate::engine::{TaskName, TaskOutcome};
use crate::errors::TaskError;
use crate::types::TaskKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Not dispatched (yet, or ever, if an earlier layer failed).
    Pending,
    /// Dispatched to the runner; executor call outstanding.
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
pub struct TaskState {
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub attempts: u32,
    pub last_error: Option<TaskError>,
    pub duration: Duration,
}

impl TaskState {
    fn new(kind: TaskKind) -> Self {
        Self {
            kind,
            status: TaskStatus::Pending,
            attempts: 0,
            last_error: None,
            duration: Duration::ZERO,
        }
    }
}

/// All task states for one run, kept in layer order for reporting.
#[derive(Debug, Clone)]
pub struct RunState {
    order: Vec<TaskName>,
    tasks: HashMap<TaskName, TaskState>,
}

impl RunState {
    /// Every task starts `Pending`.
    pub fn new(graph: &DependencyGraph, layers: &[Vec<TaskName>]) -> Self {
        let order: Vec<TaskName> = layers.iter().flatten().cloned().collect();
        let tasks = order
            .iter()
            .filter_map(|name| {
                graph
                    .task(name)
                    .map(|spec| (name.clone(), TaskState::new(spec.kind())))
            })
            .collect();
        Self { order, tasks }
    }

    /// Pending -> Running.
    pub fn mark_running(&mut self, task: &str) {
        match self.tasks.get_mut(task) {
            Some(state) if state.status == TaskStatus::Pending => {
                state.status = TaskStatus::Running;
                debug!(task = %task, "marked Running");
            }
            Some(state) => {
                warn!(task = %task, status = ?state.status, "cannot start task that is not Pending");
            }
            None => warn!(task = %task, "unknown task; ignoring start"),
        }
    }

    /// Running -> Succeeded | Failed.
    pub fn record_outcome(&mut self, task: &str, outcome: TaskOutcome) {
        let Some(state) = self.tasks.get_mut(task) else {
            warn!(task = %task, "outcome for unknown task; ignoring");
            return;
        };
        if state.status != TaskStatus::Running {
            warn!(task = %task, status = ?state.status, "outcome for task that is not Running");
        }

        state.attempts = outcome.attempts;
        state.duration = outcome.duration;
        match outcome.result {
            Ok(()) => {
                state.status = TaskStatus::Succeeded;
                state.last_error = None;
            }
            Err(e) => {
                state.status = TaskStatus::Failed;
                state.last_error = Some(e);
            }
        }
    }

    /// Mark any of `tasks` still `Running` as failed.
    pub fn fail_unfinished(&mut self, tasks: &[TaskName], reason: &str) {
        for name in tasks {
            if let Some(state) = self.tasks.get_mut(name) {
                if state.status == TaskStatus::Running {
                    warn!(task = %name, %reason, "task did not finish; marking Failed");
                    state.status = TaskStatus::Failed;
                    state.attempts = state.attempts.max(1);
                    state.last_error = Some(TaskError::Aborted(reason.to_string()));
                }
            }
        }
    }

    /// Failed tasks, in layer order.
    pub fn failed_tasks(&self) -> Vec<TaskName> {
        self.order
            .iter()
            .filter(|name| {
                self.tasks
                    .get(name.as_str())
                    .is_some_and(|s| s.status == TaskStatus::Failed)
            })
            .cloned()
            .collect()
    }

    pub fn to_report(&self, duration: Duration) -> RunReport {
        let tasks = self
            .order
            .iter()
            .filter_map(|name| {
                self.tasks.get(name).map(|state| TaskReport {
                    name: name.clone(),
                    kind: state.kind,
                    status: state.status,
                    attempts: state.attempts,
                    duration: state.duration,
                    error: state.last_error.as_ref().map(|e| e.to_string()),
                })
            })
            .collect();

        RunReport { tasks, duration }
    }
}
