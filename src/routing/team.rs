//! Team routing.
//!
//! Two phases: the domain classifier picks a team (tier plays no part), then
//! the team's own rule picks a member. Each team knows its vocabulary, e.g.
//! the testing team sends "unit"/"mock" work to one specialist and
//! "integration"/"end-to-end" work to another, and keeps strategy questions or
//! undecided requests with its lead.

use crate::agent::AgentRegistry;
use crate::core::task::Task;
use crate::error::{Error, Result};
use crate::routing::classifier::DomainClassifier;
use crate::routing::patterns::{PatternSet, PatternSpec};
use crate::routing::router::{MatchReason, Route, Router, RoutingDecision};
use crate::routing::tier::TierSelector;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMemberSpec {
    pub role: String,
    #[serde(default)]
    pub patterns: Vec<PatternSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamSpec {
    pub name: String,
    pub domain: String,
    pub lead: String,
    #[serde(default)]
    pub members: Vec<TeamMemberSpec>,
}

#[derive(Debug, Clone)]
struct Member {
    role: String,
    patterns: PatternSet,
}

/// A domain team with an internal selection rule.
#[derive(Debug, Clone)]
pub struct Team {
    name: String,
    domain: String,
    lead: String,
    members: Vec<Member>,
}

/// Result of a team's internal rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamChoice {
    pub role: String,
    pub reason: MatchReason,
    pub ambiguous: bool,
}

impl Team {
    pub fn compile(spec: &TeamSpec) -> Result<Self> {
        let members = spec
            .members
            .iter()
            .map(|m| {
                Ok(Member {
                    role: m.role.clone(),
                    patterns: PatternSet::compile(&m.patterns)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            name: spec.name.clone(),
            domain: spec.domain.clone(),
            lead: spec.lead.clone(),
            members,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn lead(&self) -> &str {
        &self.lead
    }

    /// Roles this team can hand work to, lead first.
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.lead.as_str()).chain(self.members.iter().map(|m| m.role.as_str()))
    }

    /// Pick a member by unique top score; otherwise the lead.
    pub fn select(&self, description: &str) -> TeamChoice {
        let scores: Vec<(&str, u32)> = self
            .members
            .iter()
            .map(|m| (m.role.as_str(), m.patterns.score(description)))
            .collect();
        let top = scores.iter().map(|(_, s)| *s).max().unwrap_or(0);
        if top == 0 {
            return TeamChoice {
                role: self.lead.clone(),
                reason: MatchReason::TeamLead,
                ambiguous: false,
            };
        }

        let winners: Vec<&str> = scores
            .iter()
            .filter(|(_, s)| *s == top)
            .map(|(role, _)| *role)
            .collect();
        if winners.len() > 1 {
            return TeamChoice {
                role: self.lead.clone(),
                reason: MatchReason::TeamLead,
                ambiguous: true,
            };
        }

        TeamChoice {
            role: winners[0].to_string(),
            reason: MatchReason::TeamRule,
            ambiguous: false,
        }
    }
}

/// Router that delegates to domain teams.
///
/// Domains without a team go to the fallback router when one is set, or to
/// the registry's default worker.
#[derive(Debug, Clone)]
pub struct TeamRouter {
    classifier: DomainClassifier,
    tiers: TierSelector,
    teams: Vec<Team>,
    registry: Arc<AgentRegistry>,
    fallback: Option<Router>,
}

impl TeamRouter {
    /// # Errors
    /// [`Error::UnknownAgent`] if a lead or member is not in the registry, and
    /// [`Error::Validation`] if two teams claim the same domain.
    pub fn new(
        classifier: DomainClassifier,
        tiers: TierSelector,
        teams: Vec<Team>,
        registry: Arc<AgentRegistry>,
    ) -> Result<Self> {
        for (i, team) in teams.iter().enumerate() {
            if let Some(role) = team.roles().find(|r| !registry.contains(r)) {
                return Err(Error::UnknownAgent(role.to_string()));
            }
            if teams[..i].iter().any(|t| t.domain == team.domain) {
                return Err(Error::Validation(format!(
                    "more than one team for domain '{}'",
                    team.domain
                )));
            }
        }

        Ok(Self {
            classifier,
            tiers,
            teams,
            registry,
            fallback: None,
        })
    }

    pub fn with_fallback(mut self, router: Router) -> Self {
        self.fallback = Some(router);
        self
    }

    pub fn team_for(&self, domain: &str) -> Option<&Team> {
        self.teams.iter().find(|t| t.domain == domain)
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }
}

impl Route for TeamRouter {
    fn route(&self, task: &Task) -> RoutingDecision {
        let classification = self.classifier.classify_detailed(&task.description);
        let requested_tier = self.tiers.select_tier(&task.description);

        let Some(team) = self.team_for(&classification.domain) else {
            if let Some(router) = &self.fallback {
                return router.route(task);
            }
            let agent = self.registry.default_agent();
            return RoutingDecision {
                task_id: task.id.clone(),
                selected_worker_role: agent.role.clone(),
                domain: classification.domain,
                tier: agent.tier,
                requested_tier,
                match_reason: MatchReason::DefaultFallback,
                ambiguous: classification.ambiguous,
            };
        };

        let choice = team.select(&task.description);
        let ambiguous = classification.ambiguous || choice.ambiguous;
        if ambiguous {
            warn!(
                task_id = %task.id,
                team = team.name(),
                worker = %choice.role,
                "RoutingAmbiguity: team rule undecided"
            );
        }

        // Roles are checked against the registry in `new`.
        let tier = self
            .registry
            .get(&choice.role)
            .map(|a| a.tier)
            .unwrap_or(requested_tier);
        debug!(
            task_id = %task.id,
            team = team.name(),
            worker = %choice.role,
            reason = %choice.reason,
            "routed task via team"
        );

        RoutingDecision {
            task_id: task.id.clone(),
            selected_worker_role: choice.role,
            domain: classification.domain,
            tier,
            requested_tier,
            match_reason: choice.reason,
            ambiguous,
        }
    }
}
