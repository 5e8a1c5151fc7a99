pub mod agent;
pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod routing;

pub use agent::{Agent, AgentRegistry, Tier};
pub use config::Config;
pub use core::{Priority, Task, TaskBatch, TaskId, TaskStatus};
pub use error::{Error, PlanningError, Result};
pub use orchestration::{
    Coordinator, ExecutionPlan, ExecutionReport, ExecutionResult, Pipeline, Planner, PlanningPolicy,
};
pub use routing::{Route, Router, RoutingDecision, TeamRouter};
