use thiserror::Error;

use crate::agent::Tier;
use crate::core::task::TaskId;
use crate::orchestration::ExecutionReport;

/// Errors raised while turning a task batch into an execution plan.
///
/// Every variant is fatal for the batch: the plan is rejected before any
/// task is dispatched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanningError {
    #[error("Dependency cycle detected at task: {task}")]
    Cycle { task: TaskId },

    #[error("Task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    #[error("Task {task} depends on itself")]
    SelfDependency { task: TaskId },

    #[error("Duplicate task id: {0}")]
    DuplicateTask(TaskId),

    #[error("Task not found in batch: {0}")]
    UnknownTask(TaskId),

    #[error("No routing decision for task: {0}")]
    MissingAssignment(TaskId),

    #[error(
        "Task {task} ({task_tier}) depends on {dependency} ({dependency_tier}), which runs in a later tier; use the flat planning policy"
    )]
    TierInversion {
        task: TaskId,
        task_tier: Tier,
        dependency: TaskId,
        dependency_tier: Tier,
    },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Duplicate agent role: {0}")]
    DuplicateAgent(String),

    #[error("Agent not found: {0}")]
    UnknownAgent(String),

    #[error("Invalid task transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Backend binary not found: {0}")]
    BackendNotFound(String),

    #[error("Planning error: {0}")]
    Planning(#[from] PlanningError),

    #[error("Backend unavailable: {message}")]
    BackendUnavailable {
        message: String,
        partial: Box<ExecutionReport>,
    },
}

impl Error {
    /// Results collected before a run-level abort, if any.
    pub fn partial_report(&self) -> Option<&ExecutionReport> {
        match self {
            Error::BackendUnavailable { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
