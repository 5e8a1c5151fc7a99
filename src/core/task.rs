//! Task data model.
//!
//! Tasks are immutable units of work supplied by the caller. They are
//! referenced by id from routing decisions, plans and results; execution
//! state lives in [`TaskStatus`], never on the task itself.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Unique identifier for a task within a batch.
///
/// Ids are caller supplied strings (`"a"`, `"build-login"`), so ordering
/// and hashing follow the string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Create a task id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Optional scheduling hint.
///
/// Priority never changes which group a task lands in; it only orders
/// tasks inside a group, which decides start order under a concurrency cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

/// Execution state of a task inside a run.
///
/// ```text
/// Pending -> Running -> Succeeded
///                    -> Failed   --retry--> Running
///                    -> TimedOut --retry--> Running
/// Pending -> TimedOut            (deadline passed before dispatch)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Planned but not yet dispatched.
    #[default]
    Pending,
    /// An attempt is in flight.
    Running,
    /// The worker returned output.
    Succeeded,
    /// The last attempt returned an error.
    Failed,
    /// The last attempt exceeded its deadline or was cancelled.
    TimedOut,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Succeeded => write!(f, "succeeded"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::TimedOut => write!(f, "timed_out"),
        }
    }
}

impl TaskStatus {
    /// Check whether moving from `self` to `next` is a legal step.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, TimedOut)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, TimedOut)
                | (Failed, Running)
                | (TimedOut, Running)
        )
    }

    /// Move to `next`, rejecting illegal transitions.
    pub fn transition(self, next: TaskStatus) -> Result<TaskStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    /// An attempt has finished (successfully or not).
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::TimedOut
        )
    }

    pub fn is_success(self) -> bool {
        self == TaskStatus::Succeeded
    }
}

/// A unit of work to be routed, planned and dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier within the batch.
    pub id: TaskId,
    /// Free-text description handed to the worker.
    pub description: String,
    /// Tasks that must complete before this one starts.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub dependencies: BTreeSet<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl Task {
    /// Create a task with no dependencies and no priority.
    pub fn new(id: impl Into<TaskId>, description: &str) -> Self {
        Self {
            id: id.into(),
            description: description.to_string(),
            dependencies: BTreeSet::new(),
            priority: None,
        }
    }

    /// Builder: declare dependencies on other task ids.
    pub fn with_dependencies<I, T>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TaskId>,
    {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn depends_on(&self, id: &TaskId) -> bool {
        self.dependencies.contains(id)
    }

    /// Priority with the default applied.
    pub fn effective_priority(&self) -> Priority {
        self.priority.unwrap_or_default()
    }
}

/// On-disk task batch: a JSON array of tasks, or TOML with `[[tasks]]` tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskBatch {
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl TaskBatch {
    /// Parse a batch, choosing the format from the file extension
    /// (`.json` is JSON, anything else TOML).
    pub fn load(path: &Path) -> Result<Vec<Task>> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_toml(&content)
        }
    }

    /// Accepts either a bare array or `{"tasks": [...]}`.
    pub fn from_json(content: &str) -> Result<Vec<Task>> {
        let value: serde_json::Value = serde_json::from_str(content)?;
        if value.is_array() {
            Ok(serde_json::from_value(value)?)
        } else {
            Ok(serde_json::from_value::<TaskBatch>(value)?.tasks)
        }
    }

    pub fn from_toml(content: &str) -> Result<Vec<Task>> {
        Ok(toml::from_str::<TaskBatch>(content)?.tasks)
    }
}
