// src/engine/report.rs

use std::fmt;
use std::time::Duration;

use crate::engine::TaskName;
use crate::engine::state::TaskStatus;
use crate::types::TaskKind;

/// Terminal record of one task in a run.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub name: TaskName,
    pub kind: TaskKind,
    pub status: TaskStatus,
    /// Number of attempts made; 0 if the task was never dispatched.
    pub attempts: u32,
    pub duration: Duration,
    pub error: Option<String>,
}

/// Summary handed back to whoever scheduled the run.
///
/// Tasks are listed in layer order, so two runs of the same graph produce
/// reports in the same order.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub tasks: Vec<TaskReport>,
    pub duration: Duration,
}

impl RunReport {
    pub fn task(&self, name: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn status_of(&self, name: &str) -> Option<TaskStatus> {
        self.task(name).map(|t| t.status)
    }

    /// `(name, status)` pairs in report order.
    pub fn statuses(&self) -> Vec<(TaskName, TaskStatus)> {
        self.tasks
            .iter()
            .map(|t| (t.name.clone(), t.status))
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.tasks.iter().all(|t| t.status == TaskStatus::Succeeded)
    }

    pub fn failed_tasks(&self) -> Vec<&TaskReport> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .collect()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .tasks
            .iter()
            .map(|t| t.name.len())
            .max()
            .unwrap_or(4)
            .max(4);

        writeln!(f, "{:<width$}  {:<14}  {:<9}  {:>8}  {:>10}", "TASK", "KIND", "STATUS", "ATTEMPTS", "DURATION")?;
        for t in self.tasks.iter() {
            writeln!(
                f,
                "{:<width$}  {:<14}  {:<9}  {:>8}  {:>10}",
                t.name,
                t.kind.to_string(),
                format!("{:?}", t.status),
                t.attempts,
                format!("{:.2?}", t.duration),
            )?;
            if let Some(ref err) = t.error {
                writeln!(f, "{:<width$}    error: {err}", "")?;
            }
        }
        write!(f, "total: {:.2?}", self.duration)
    }
}
