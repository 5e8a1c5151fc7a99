//! Execution planning.
//!
//! Turns a routed task batch into an [`ExecutionPlan`]: parallel groups that
//! run strictly one after another. Under the tier-barrier policy every tier-1
//! group comes before every tier-2 group, which comes before every tier-3
//! group; inside a tier, tasks are levelled by their explicit dependencies.
//! The flat policy drops the barrier and levels by dependencies alone.

use crate::agent::Tier;
use crate::core::dag::TaskDAG;
use crate::core::task::{Task, TaskId};
use crate::error::PlanningError;
use crate::routing::router::RoutingDecision;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanningPolicy {
    /// No tier starts until every lower tier has finished.
    #[default]
    TierBarrier,
    /// Dependency-only grouping.
    Flat,
}

/// Where a task was routed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub worker_role: String,
    pub tier: Tier,
    pub domain: String,
}

impl From<&RoutingDecision> for Assignment {
    fn from(decision: &RoutingDecision) -> Self {
        Self {
            worker_role: decision.selected_worker_role.clone(),
            tier: decision.tier,
            domain: decision.domain.clone(),
        }
    }
}

/// Tasks that may run concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelGroup {
    /// Tier this group belongs to; `None` under the flat policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Tier>,
    /// Highest priority first, then input order.
    pub tasks: Vec<TaskId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub policy: PlanningPolicy,
    /// Groups flattened in order.
    pub task_order: Vec<TaskId>,
    pub task_assignments: BTreeMap<TaskId, Assignment>,
    pub parallel_groups: Vec<ParallelGroup>,
}

impl ExecutionPlan {
    pub fn empty(policy: PlanningPolicy) -> Self {
        Self {
            policy,
            task_order: Vec::new(),
            task_assignments: BTreeMap::new(),
            parallel_groups: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.task_order.is_empty()
    }

    pub fn task_count(&self) -> usize {
        self.task_order.len()
    }

    pub fn group_count(&self) -> usize {
        self.parallel_groups.len()
    }

    pub fn group_index(&self, task_id: &TaskId) -> Option<usize> {
        self.parallel_groups
            .iter()
            .position(|g| g.tasks.contains(task_id))
    }

    pub fn assignment(&self, task_id: &TaskId) -> Option<&Assignment> {
        self.task_assignments.get(task_id)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Planner {
    policy: PlanningPolicy,
}

impl Planner {
    pub fn new(policy: PlanningPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> PlanningPolicy {
        self.policy
    }

    fn stage(&self, tier: Tier) -> Option<Tier> {
        match self.policy {
            PlanningPolicy::TierBarrier => Some(tier),
            PlanningPolicy::Flat => None,
        }
    }

    /// Build a plan for one batch.
    ///
    /// Pure: the same tasks and decisions always give the same plan.
    ///
    /// # Errors
    /// Any [`PlanningError`]; nothing is dispatched for a rejected batch.
    pub fn plan(
        &self,
        tasks: &[Task],
        decisions: &[RoutingDecision],
    ) -> Result<ExecutionPlan, PlanningError> {
        let dag = TaskDAG::from_tasks(tasks)?;

        let mut task_assignments = BTreeMap::new();
        for decision in decisions {
            if !dag.contains_task(&decision.task_id) {
                return Err(PlanningError::UnknownTask(decision.task_id.clone()));
            }
            task_assignments.insert(decision.task_id.clone(), Assignment::from(decision));
        }

        let tier_of = |id: &TaskId| {
            task_assignments
                .get(id)
                .map(|a: &Assignment| a.tier)
                .ok_or_else(|| PlanningError::MissingAssignment(id.clone()))
        };

        let mut input_index: HashMap<&TaskId, usize> = HashMap::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            let tier = tier_of(&task.id)?;
            input_index.insert(&task.id, i);

            if self.policy == PlanningPolicy::TierBarrier {
                for dep in &task.dependencies {
                    let dep_tier = tier_of(dep)?;
                    if dep_tier > tier {
                        return Err(PlanningError::TierInversion {
                            task: task.id.clone(),
                            task_tier: tier,
                            dependency: dep.clone(),
                            dependency_tier: dep_tier,
                        });
                    }
                }
            }
        }

        // Level within a stage: one past the deepest same-stage dependency.
        // Dependencies in earlier stages are already covered by the barrier.
        let mut levels: HashMap<&TaskId, usize> = HashMap::with_capacity(tasks.len());
        for id in dag.topological_order()? {
            let stage = self.stage(tier_of(id)?);
            let mut level = 0;
            for dep in dag.dependencies_of(id) {
                if self.stage(tier_of(dep)?) == stage {
                    level = level.max(levels.get(dep).map_or(0, |l| l + 1));
                }
            }
            levels.insert(id, level);
        }

        let mut buckets: BTreeMap<(Option<Tier>, usize), Vec<&Task>> = BTreeMap::new();
        for task in tasks {
            let stage = self.stage(tier_of(&task.id)?);
            let level = levels.get(&task.id).copied().unwrap_or(0);
            buckets.entry((stage, level)).or_default().push(task);
        }

        let parallel_groups: Vec<ParallelGroup> = buckets
            .into_iter()
            .map(|((stage, _), mut members)| {
                members.sort_by_key(|t| {
                    (
                        Reverse(t.effective_priority()),
                        input_index.get(&t.id).copied().unwrap_or(usize::MAX),
                    )
                });
                ParallelGroup {
                    stage,
                    tasks: members.into_iter().map(|t| t.id.clone()).collect(),
                }
            })
            .collect();

        let task_order: Vec<TaskId> = parallel_groups
            .iter()
            .flat_map(|g| g.tasks.iter().cloned())
            .collect();

        for (i, group) in parallel_groups.iter().enumerate() {
            debug!(group = i, stage = ?group.stage, tasks = ?group.tasks, "planned group");
        }
        info!(
            tasks = task_order.len(),
            groups = parallel_groups.len(),
            policy = ?self.policy,
            "execution plan built"
        );

        Ok(ExecutionPlan {
            policy: self.policy,
            task_order,
            task_assignments,
            parallel_groups,
        })
    }
}
