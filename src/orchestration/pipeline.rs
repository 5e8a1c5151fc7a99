//! Route, plan, execute.

use crate::config::Config;
use crate::core::task::Task;
use crate::error::Result;
use crate::orchestration::coordinator::Coordinator;
use crate::orchestration::planner::{ExecutionPlan, Planner};
use crate::orchestration::report::ExecutionReport;
use crate::routing::{Route, RoutingDecision};
use serde::Serialize;
use tracing::{info, warn};

/// Everything one batch went through.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub decisions: Vec<RoutingDecision>,
    pub plan: ExecutionPlan,
    pub report: ExecutionReport,
}

pub struct Pipeline {
    router: Box<dyn Route>,
    planner: Planner,
    coordinator: Coordinator,
}

impl Pipeline {
    pub fn new(router: Box<dyn Route>, planner: Planner, coordinator: Coordinator) -> Self {
        Self {
            router,
            planner,
            coordinator,
        }
    }

    /// Build router, planner and coordinator from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let coordinator = Coordinator::new(config.build_backends()?, config.coordinator.options());
        Ok(Self::new(config.build_route()?, config.build_planner(), coordinator))
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn route(&self, tasks: &[Task]) -> Vec<RoutingDecision> {
        let decisions = self.router.route_all(tasks);
        let ambiguous = decisions.iter().filter(|d| d.ambiguous).count();
        if ambiguous > 0 {
            warn!(ambiguous, "some routing decisions were ties");
        }
        decisions
    }

    /// Route and plan without dispatching anything.
    pub fn plan(&self, tasks: &[Task]) -> Result<(Vec<RoutingDecision>, ExecutionPlan)> {
        let decisions = self.route(tasks);
        let plan = self.planner.plan(tasks, &decisions)?;
        Ok((decisions, plan))
    }

    /// Route, plan and execute a batch.
    ///
    /// Planning errors surface before any dispatch. A run aborted by an
    /// unreachable backend returns the error with its partial report.
    pub async fn run(&self, tasks: &[Task]) -> Result<PipelineRun> {
        let (decisions, plan) = self.plan(tasks)?;
        info!(
            tasks = plan.task_count(),
            groups = plan.group_count(),
            policy = ?plan.policy,
            "plan ready"
        );
        let report = self.coordinator.execute(&plan, tasks).await?;
        Ok(PipelineRun {
            decisions,
            plan,
            report,
        })
    }
}
