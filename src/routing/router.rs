//! Task router.
//!
//! Maps one task to exactly one worker. The fallback chain is:
//!
//! 1. **Exact**: selected tier and selected domain. Workers without a domain
//!    tag qualify here when their capabilities match the description.
//! 2. **Tier fallback**: selected tier, any domain, capabilities match.
//! 3. **Capability fallback**: any tier, capabilities match. Keeps flat,
//!    untiered rosters working.
//! 4. **Default**: the registry's default (top-level orchestration) worker.
//!
//! Routing is pure and total: the same inputs always give the same decision
//! and every task gets one.

use crate::agent::{Agent, AgentRegistry, Tier};
use crate::core::task::{Task, TaskId};
use crate::routing::classifier::DomainClassifier;
use crate::routing::tier::TierSelector;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Which rule produced a routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    Exact,
    TierFallback,
    CapabilityFallback,
    /// Nothing matched; the default worker took the task.
    DefaultFallback,
    /// A team's own rule picked a member.
    TeamRule,
    /// A team matched but its rule was undecided; the lead took the task.
    TeamLead,
}

impl std::fmt::Display for MatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchReason::Exact => write!(f, "exact"),
            MatchReason::TierFallback => write!(f, "tier-fallback"),
            MatchReason::CapabilityFallback => write!(f, "capability-fallback"),
            MatchReason::DefaultFallback => write!(f, "default-fallback"),
            MatchReason::TeamRule => write!(f, "team-rule"),
            MatchReason::TeamLead => write!(f, "team-lead"),
        }
    }
}

/// How to choose among several eligible workers in one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Highest capability score; registration order breaks ties.
    #[default]
    BestMatch,
    /// First eligible worker in registration order. Workers whose
    /// capabilities are a subset of an earlier worker's never win.
    FirstMatch,
}

/// The router's answer for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub task_id: TaskId,
    pub selected_worker_role: String,
    pub domain: String,
    /// Tier of the selected worker. Under fallback this can differ from
    /// `requested_tier`; the planner orders by this one.
    pub tier: Tier,
    /// Tier the selector asked for.
    pub requested_tier: Tier,
    pub match_reason: MatchReason,
    /// Classification or worker choice was a tie resolved by ordering.
    #[serde(default)]
    pub ambiguous: bool,
}

/// Anything that can route tasks.
pub trait Route: Send + Sync {
    fn route(&self, task: &Task) -> RoutingDecision;

    fn route_all(&self, tasks: &[Task]) -> Vec<RoutingDecision> {
        tasks.iter().map(|task| self.route(task)).collect()
    }
}

/// Tier-and-domain router over a shared registry.
#[derive(Debug, Clone)]
pub struct Router {
    classifier: DomainClassifier,
    tiers: TierSelector,
    registry: Arc<AgentRegistry>,
    strategy: MatchStrategy,
}

impl Router {
    pub fn new(
        classifier: DomainClassifier,
        tiers: TierSelector,
        registry: Arc<AgentRegistry>,
    ) -> Self {
        Self {
            classifier,
            tiers,
            registry,
            strategy: MatchStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: MatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> MatchStrategy {
        self.strategy
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Choose one worker among scored candidates (registration order).
    ///
    /// Returns the worker and whether the choice was a tie.
    fn pick<'a, I>(&self, candidates: I) -> Option<(&'a Agent, bool)>
    where
        I: Iterator<Item = (&'a Agent, u32)>,
    {
        match self.strategy {
            MatchStrategy::FirstMatch => {
                let mut candidates = candidates;
                let first = candidates.next()?;
                Some((first.0, false))
            }
            MatchStrategy::BestMatch => {
                let mut best: Option<(&Agent, u32)> = None;
                let mut tied = false;
                for (agent, score) in candidates {
                    match best {
                        None => best = Some((agent, score)),
                        Some((_, top)) if score > top => {
                            best = Some((agent, score));
                            tied = false;
                        }
                        Some((_, top)) if score == top => tied = true,
                        _ => {}
                    }
                }
                best.map(|(agent, _)| (agent, tied))
            }
        }
    }

    fn select(&self, description: &str, domain: &str, tier: Tier) -> (&Agent, MatchReason, bool) {
        let scored = |agent: &Agent| agent.capability_score(description);

        let exact = self.registry.agents().filter(|a| a.tier == tier).filter_map(|a| {
            let score = scored(a);
            let eligible = a.in_domain(domain) || (a.domain.is_none() && score > 0);
            eligible.then_some((a, score))
        });
        if let Some((agent, tied)) = self.pick(exact) {
            return (agent, MatchReason::Exact, tied);
        }

        let tier_only = self
            .registry
            .at_tier(tier)
            .map(|a| (a, scored(a)))
            .filter(|(_, score)| *score > 0);
        if let Some((agent, tied)) = self.pick(tier_only) {
            return (agent, MatchReason::TierFallback, tied);
        }

        let any_tier = self
            .registry
            .agents()
            .map(|a| (a, scored(a)))
            .filter(|(_, score)| *score > 0);
        if let Some((agent, tied)) = self.pick(any_tier) {
            return (agent, MatchReason::CapabilityFallback, tied);
        }

        (self.registry.default_agent(), MatchReason::DefaultFallback, false)
    }
}

impl Route for Router {
    fn route(&self, task: &Task) -> RoutingDecision {
        let classification = self.classifier.classify_detailed(&task.description);
        let requested_tier = self.tiers.select_tier(&task.description);
        let (agent, match_reason, tied) =
            self.select(&task.description, &classification.domain, requested_tier);
        let ambiguous = classification.ambiguous || tied;

        if ambiguous {
            warn!(
                task_id = %task.id,
                domain = %classification.domain,
                worker = %agent.role,
                scores = ?classification.scores,
                "RoutingAmbiguity: tie resolved by fixed ordering"
            );
        }
        debug!(
            task_id = %task.id,
            domain = %classification.domain,
            requested_tier = %requested_tier,
            worker = %agent.role,
            reason = %match_reason,
            "routed task"
        );

        RoutingDecision {
            task_id: task.id.clone(),
            selected_worker_role: agent.role.clone(),
            domain: classification.domain,
            tier: agent.tier,
            requested_tier,
            match_reason,
            ambiguous,
        }
    }
}
