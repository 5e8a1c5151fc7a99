//! Planning tests: routing decisions in, execution plan out.

use std::collections::HashSet;

use switchyard::agent::Tier;
use switchyard::config::Config;
use switchyard::core::task::{Priority, Task, TaskId};
use switchyard::error::PlanningError;
use switchyard::orchestration::{Planner, PlanningPolicy};
use switchyard::routing::Route;

use crate::fixtures::{group_ids, group_index, release_batch, sprint_scenario};

fn plan_with(policy: PlanningPolicy, tasks: &[Task]) -> Result<switchyard::ExecutionPlan, PlanningError> {
    let decisions = Config::default().build_route().unwrap().route_all(tasks);
    Planner::new(policy).plan(tasks, &decisions)
}

/// Test: the sprint scenario
/// Given plan / design / implement tasks where only c depends on b
/// When planned with the tier barrier
/// Then every task gets its own group in tier order
#[test]
fn test_sprint_scenario_groups() {
    let plan = plan_with(PlanningPolicy::TierBarrier, &sprint_scenario()).unwrap();
    assert_eq!(group_ids(&plan), vec![vec!["a"], vec!["b"], vec!["c"]]);
    assert_eq!(plan.task_order, vec![TaskId::from("a"), TaskId::from("b"), TaskId::from("c")]);
    assert_eq!(plan.assignment(&TaskId::from("c")).unwrap().worker_role, "backend-dev");
}

/// Test: tier barrier layout of a mixed batch
#[test]
fn test_release_batch_barrier_layout() {
    let plan = plan_with(PlanningPolicy::TierBarrier, &release_batch()).unwrap();
    assert_eq!(
        group_ids(&plan),
        vec![vec!["a", "f"], vec!["b", "g"], vec!["c", "e"], vec!["d", "h"]]
    );
    let stages: Vec<Option<Tier>> = plan.parallel_groups.iter().map(|g| g.stage).collect();
    assert_eq!(
        stages,
        vec![
            Some(Tier::Orchestration),
            Some(Tier::DomainLead),
            Some(Tier::Specialist),
            Some(Tier::Specialist),
        ]
    );
}

/// Test: flat planning only follows explicit dependencies
#[test]
fn test_release_batch_flat_layout() {
    let plan = plan_with(PlanningPolicy::Flat, &release_batch()).unwrap();
    assert_eq!(
        group_ids(&plan),
        vec![vec!["a", "b", "e", "f"], vec!["c", "g", "h"], vec!["d"]]
    );
    assert!(plan.parallel_groups.iter().all(|g| g.stage.is_none()));
}

/// Test: plan properties hold under both policies
/// - every task appears in exactly one group
/// - dependencies sit in strictly earlier groups
/// - under the barrier, tiers never decrease from one group to the next
#[test]
fn test_plan_properties() {
    let tasks = release_batch();
    for policy in [PlanningPolicy::TierBarrier, PlanningPolicy::Flat] {
        let plan = plan_with(policy, &tasks).unwrap();
        let index = group_index(&plan);

        let mut seen = HashSet::new();
        for group in &plan.parallel_groups {
            for id in &group.tasks {
                assert!(seen.insert(id.clone()), "{} appears twice", id);
            }
        }
        assert_eq!(seen.len(), tasks.len());
        assert_eq!(plan.task_order.len(), tasks.len());

        for task in &tasks {
            for dep in &task.dependencies {
                assert!(index[dep] < index[&task.id], "{} must follow {}", task.id, dep);
            }
        }

        if policy == PlanningPolicy::TierBarrier {
            let tier_of = |id: &TaskId| plan.assignment(id).unwrap().tier;
            for pair in plan.parallel_groups.windows(2) {
                let max_before = pair[0].tasks.iter().map(tier_of).max().unwrap();
                let min_after = pair[1].tasks.iter().map(tier_of).min().unwrap();
                assert!(max_before <= min_after);
            }
        }
    }
}

/// Test: priority orders tasks inside a group but never moves them between groups
#[test]
fn test_priority_orders_within_group() {
    let tasks = vec![
        Task::new("low", "implement search endpoint").with_priority(Priority::Low),
        Task::new("normal", "implement login endpoint"),
        Task::new("urgent", "implement logout endpoint").with_priority(Priority::Critical),
    ];
    let plan = plan_with(PlanningPolicy::TierBarrier, &tasks).unwrap();
    assert_eq!(group_ids(&plan), vec![vec!["urgent", "normal", "low"]]);
}

/// Test: a dependency on a later-tier task is rejected by the barrier but fine when flat
#[test]
fn test_tier_inversion() {
    let tasks = vec![
        Task::new("impl", "implement login endpoint"),
        Task::new("review", "review the login endpoint").with_dependencies(["impl"]),
    ];
    let err = plan_with(PlanningPolicy::TierBarrier, &tasks).unwrap_err();
    assert!(matches!(err, PlanningError::TierInversion { .. }));
    assert!(err.to_string().contains("flat"));

    let plan = plan_with(PlanningPolicy::Flat, &tasks).unwrap();
    assert_eq!(group_ids(&plan), vec![vec!["impl"], vec!["review"]]);
}

/// Test: malformed batches are rejected whole
#[test]
fn test_fatal_planning_errors() {
    let dangling = vec![Task::new("a", "write docs").with_dependencies(["ghost"])];
    assert!(matches!(
        plan_with(PlanningPolicy::TierBarrier, &dangling),
        Err(PlanningError::UnknownDependency { .. })
    ));

    let cyclic = vec![
        Task::new("a", "write docs").with_dependencies(["b"]),
        Task::new("b", "write guide").with_dependencies(["a"]),
    ];
    assert!(matches!(
        plan_with(PlanningPolicy::Flat, &cyclic),
        Err(PlanningError::Cycle { .. })
    ));

    let selfish = vec![Task::new("a", "write docs").with_dependencies(["a"])];
    assert!(matches!(
        plan_with(PlanningPolicy::Flat, &selfish),
        Err(PlanningError::SelfDependency { .. })
    ));

    let duplicate = vec![Task::new("a", "write docs"), Task::new("a", "write guide")];
    assert!(matches!(
        plan_with(PlanningPolicy::Flat, &duplicate),
        Err(PlanningError::DuplicateTask(_))
    ));
}

/// Test: repeated planning yields identical plans
#[test]
fn test_planning_is_deterministic() {
    let tasks = release_batch();
    let first = plan_with(PlanningPolicy::TierBarrier, &tasks).unwrap();
    for _ in 0..10 {
        assert_eq!(plan_with(PlanningPolicy::TierBarrier, &tasks).unwrap(), first);
    }
}

#[test]
fn test_empty_batch_plans_empty() {
    let plan = plan_with(PlanningPolicy::TierBarrier, &[]).unwrap();
    assert!(plan.is_empty());
    assert_eq!(plan.group_count(), 0);
}
