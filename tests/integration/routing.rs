//! Routing tests over the default configuration.

use switchyard::agent::Tier;
use switchyard::config::Config;
use switchyard::core::task::Task;
use switchyard::routing::{MatchReason, MatchStrategy, Route};

use crate::fixtures::release_batch;

/// Test: every task in a mixed batch lands on the expected worker
/// Given the default roster
/// When the release batch is routed
/// Then each task gets the specialist, lead or orchestrator for its domain and tier
#[test]
fn test_release_batch_routing() {
    let router = Config::default().build_route().unwrap();
    let decisions = router.route_all(&release_batch());

    let roles: Vec<(&str, &str, Tier)> = decisions
        .iter()
        .map(|d| (d.task_id.as_str(), d.selected_worker_role.as_str(), d.tier))
        .collect();
    assert_eq!(roles[0], ("a", "orchestrator", Tier::Orchestration));
    assert_eq!(roles[1], ("b", "backend-lead", Tier::DomainLead));
    assert_eq!(roles[2], ("c", "backend-dev", Tier::Specialist));
    assert_eq!(roles[3], ("d", "unit-tester", Tier::Specialist));
    assert_eq!(roles[4], ("e", "devops", Tier::Specialist));
    assert_eq!(roles[5].2, Tier::Orchestration);
    assert_eq!(roles[6], ("g", "backend-lead", Tier::DomainLead));
    assert_eq!(roles[7], ("h", "docs-writer", Tier::Specialist));

    assert_eq!(decisions[3].domain, "testing");
    assert_eq!(decisions[4].domain, "infrastructure");
}

/// Test: routing is total
/// Given descriptions that match nothing
/// When routed
/// Then the default worker takes them with a default-fallback reason
#[test]
fn test_unmatched_tasks_still_route() {
    let router = Config::default().build_route().unwrap();
    for description in ["", "zzz qqq", "????"] {
        let decision = router.route(&Task::new("x", description));
        assert_eq!(decision.selected_worker_role, "orchestrator");
        assert_eq!(decision.match_reason, MatchReason::DefaultFallback);
        assert_eq!(decision.domain, "general");
    }
}

/// Test: an anchor tag outweighs the vocabulary of another domain
#[test]
fn test_anchor_tag_wins_domain() {
    let router = Config::default().build_route().unwrap();
    let plain = router.route(&Task::new("x", "document the REST API endpoints and database schema"));
    assert_eq!(plain.domain, "backend");

    let tagged = router.route(&Task::new(
        "y",
        "[docs] document the REST API endpoints and database schema",
    ));
    assert_eq!(tagged.domain, "documentation");
}

/// Test: team routing picks members by the team's own rules
/// Given `use_teams`
/// When testing and backend tasks are routed
/// Then team members are chosen and teamless domains fall through
#[test]
fn test_team_routing() {
    let mut config = Config::default();
    config.routing.use_teams = true;
    let router = config.build_route().unwrap();

    let integration = router.route(&Task::new("t1", "write integration tests for the payments module"));
    assert_eq!(integration.selected_worker_role, "integration-tester");
    assert_eq!(integration.match_reason, MatchReason::TeamRule);

    let schema = router.route(&Task::new("t2", "design the database schema"));
    assert_eq!(schema.selected_worker_role, "db-specialist");
    assert_eq!(schema.tier, Tier::Specialist);
    assert_eq!(schema.requested_tier, Tier::DomainLead);

    let deploy = router.route(&Task::new("t3", "add docker deployment"));
    assert_eq!(deploy.selected_worker_role, "devops");
}

/// Test: routing is deterministic across router instances
#[test]
fn test_routing_is_deterministic() {
    let config = Config::default();
    let batch = release_batch();
    let first = config.build_route().unwrap().route_all(&batch);
    for _ in 0..5 {
        assert_eq!(config.build_route().unwrap().route_all(&batch), first);
    }
}

/// Test: a saved configuration routes the same after reload
#[test]
fn test_config_round_trip_keeps_routing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    let mut config = Config::default();
    config.routing.strategy = MatchStrategy::FirstMatch;
    config.save_to(&path).unwrap();

    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded.routing.strategy, MatchStrategy::FirstMatch);
    let batch = release_batch();
    assert_eq!(
        loaded.build_route().unwrap().route_all(&batch),
        config.build_route().unwrap().route_all(&batch)
    );
}
