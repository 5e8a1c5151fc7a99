//! Execution tier selection.
//!
//! Tier 1 vocabulary is about planning, coordination, review and quality;
//! tier 2 about design, architecture and strategy. Implementation verbs have
//! no table of their own: a description that matches neither falls through
//! to tier 3.

use crate::agent::Tier;
use crate::error::Result;
use crate::routing::patterns::{PatternSet, PatternSpec};
use serde::{Deserialize, Serialize};

/// Tier tables as written in configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierSpec {
    #[serde(default)]
    pub orchestration: Vec<PatternSpec>,
    #[serde(default)]
    pub domain_lead: Vec<PatternSpec>,
}

#[derive(Debug, Clone)]
pub struct TierSelector {
    orchestration: PatternSet,
    domain_lead: PatternSet,
}

impl TierSelector {
    pub fn new(spec: &TierSpec) -> Result<Self> {
        Ok(Self {
            orchestration: PatternSet::compile(&spec.orchestration)?,
            domain_lead: PatternSet::compile(&spec.domain_lead)?,
        })
    }

    /// Highest-scoring tier; tier 3 when nothing matches.
    ///
    /// A tie between tiers 1 and 2 goes to tier 1.
    pub fn select_tier(&self, description: &str) -> Tier {
        let (t1, t2) = self.scores(description);
        if t1 == 0 && t2 == 0 {
            Tier::Specialist
        } else if t1 >= t2 {
            Tier::Orchestration
        } else {
            Tier::DomainLead
        }
    }

    /// Raw (tier 1, tier 2) scores.
    pub fn scores(&self, description: &str) -> (u32, u32) {
        (
            self.orchestration.score(description),
            self.domain_lead.score(description),
        )
    }
}
