//! Core domain models.
//!
//! This module contains the task model and the explicit-dependency DAG
//! that the planner builds on.

pub mod dag;
pub mod task;

pub use dag::TaskDAG;
pub use task::{Priority, Task, TaskBatch, TaskId, TaskStatus};
