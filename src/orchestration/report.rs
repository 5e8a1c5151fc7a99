//! Per-task results and the run report.

use crate::core::task::{TaskId, TaskStatus};
use crate::orchestration::backend::BackendKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Terminal outcome of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub task_id: TaskId,
    pub worker_role: String,
    /// Always terminal: succeeded, failed or timed out.
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Present iff `status` is not `Succeeded`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempt_count: u32,
    /// Backend that served the last attempt; `None` if nothing was dispatched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendKind>,
    /// Index of the parallel group the task ran in.
    pub group: usize,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn succeeded(
        task_id: TaskId,
        worker_role: &str,
        output: String,
        attempt_count: u32,
        backend: BackendKind,
        group: usize,
    ) -> Self {
        Self {
            task_id,
            worker_role: worker_role.to_string(),
            status: TaskStatus::Succeeded,
            output: Some(output),
            error: None,
            attempt_count,
            backend: Some(backend),
            group,
            finished_at: Utc::now(),
        }
    }

    /// A failed or timed-out result.
    pub fn unsuccessful(
        task_id: TaskId,
        worker_role: &str,
        status: TaskStatus,
        error: String,
        attempt_count: u32,
        backend: Option<BackendKind>,
        group: usize,
    ) -> Self {
        debug_assert!(matches!(status, TaskStatus::Failed | TaskStatus::TimedOut));
        Self {
            task_id,
            worker_role: worker_role.to_string(),
            status,
            output: None,
            error: Some(error),
            attempt_count,
            backend,
            group,
            finished_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Counts by outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub not_run: usize,
}

/// Everything a run produced. Returned whole on success and inside
/// `Error::BackendUnavailable` when a run aborts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub results: Vec<ExecutionResult>,
    /// Tasks never dispatched because the run aborted first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_run: Vec<TaskId>,
}

impl ExecutionReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            results: Vec::new(),
            not_run: Vec::new(),
        }
    }

    pub fn push(&mut self, result: ExecutionResult) {
        self.results.push(result);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn result(&self, task_id: &TaskId) -> Option<&ExecutionResult> {
        self.results.iter().find(|r| &r.task_id == task_id)
    }

    pub fn status_of(&self, task_id: &TaskId) -> Option<TaskStatus> {
        self.result(task_id).map(|r| r.status)
    }

    fn count(&self, status: TaskStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            total: self.results.len() + self.not_run.len(),
            succeeded: self.count(TaskStatus::Succeeded),
            failed: self.count(TaskStatus::Failed),
            timed_out: self.count(TaskStatus::TimedOut),
            not_run: self.not_run.len(),
        }
    }

    /// Every task ran and succeeded.
    pub fn is_success(&self) -> bool {
        self.not_run.is_empty() && self.results.iter().all(ExecutionResult::is_success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.results.iter().filter(|r| !r.is_success())
    }
}

impl Default for ExecutionReport {
    fn default() -> Self {
        Self::new()
    }
}
