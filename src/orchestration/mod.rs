//! Orchestration layer: planning, dispatch backends and plan execution.
//!
//! The [`Planner`] turns routed tasks into an [`ExecutionPlan`], the
//! [`Coordinator`] runs that plan against a [`BackendSelector`], and the
//! [`Pipeline`] chains routing, planning and execution for one batch.

pub mod backend;
pub mod coordinator;
pub mod pipeline;
pub mod planner;
pub mod report;
pub mod retry;

pub use backend::{
    BackendKind, BackendSelector, CommandBackend, DispatchError, Dispatcher, HeadlessBackend, Served,
};
pub use coordinator::{Coordinator, CoordinatorEvent, CoordinatorOptions};
pub use pipeline::{Pipeline, PipelineRun};
pub use planner::{Assignment, ExecutionPlan, ParallelGroup, Planner, PlanningPolicy};
pub use report::{ExecutionReport, ExecutionResult, ReportSummary};
pub use retry::RetryPolicy;
