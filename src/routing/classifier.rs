//! Domain classification.
//!
//! Each domain owns a weighted pattern table. Generic vocabulary carries low
//! weights; anchor patterns (an owner tag such as `[testing]` at the start of
//! a description) carry 10-25x more, so a task that talks about another
//! domain's output still lands with the team that owns it.

use crate::error::Result;
use crate::routing::patterns::{PatternSet, PatternSpec};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Label returned when no domain scores above zero.
pub const GENERAL_DOMAIN: &str = "general";

/// A domain as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainSpec {
    pub name: String,
    /// Tie-break rank; lower wins.
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub patterns: Vec<PatternSpec>,
}

impl DomainSpec {
    pub fn new(name: &str, priority: u32, patterns: Vec<PatternSpec>) -> Self {
        Self {
            name: name.to_string(),
            priority,
            patterns,
        }
    }
}

#[derive(Debug, Clone)]
struct Domain {
    name: String,
    priority: u32,
    patterns: PatternSet,
}

/// Outcome of classifying one description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub domain: String,
    pub score: u32,
    /// Another domain reached the same top score and lost on priority.
    pub ambiguous: bool,
    /// Non-zero scores in priority order.
    pub scores: Vec<(String, u32)>,
}

/// Scores descriptions against per-domain pattern tables.
#[derive(Debug, Clone)]
pub struct DomainClassifier {
    /// Sorted by (priority, name) so iteration order is the tie-break order.
    domains: Vec<Domain>,
    default_domain: String,
}

impl DomainClassifier {
    pub fn new(specs: &[DomainSpec], default_domain: &str) -> Result<Self> {
        let mut domains = specs
            .iter()
            .map(|spec| {
                Ok(Domain {
                    name: spec.name.clone(),
                    priority: spec.priority,
                    patterns: PatternSet::compile(&spec.patterns)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        domains.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));

        Ok(Self {
            domains,
            default_domain: default_domain.to_string(),
        })
    }

    /// Domain label for a description. Never fails.
    pub fn classify(&self, description: &str) -> String {
        self.classify_detailed(description).domain
    }

    /// Classification with the per-domain score breakdown.
    pub fn classify_detailed(&self, description: &str) -> Classification {
        let scores: Vec<(String, u32)> = self
            .domains
            .iter()
            .map(|d| (d.name.clone(), d.patterns.score(description)))
            .filter(|(_, score)| *score > 0)
            .collect();
        trace!(?scores, "domain scores");

        let best = scores.iter().map(|(_, s)| *s).max().unwrap_or(0);
        if best == 0 {
            return Classification {
                domain: self.default_domain.clone(),
                score: 0,
                ambiguous: false,
                scores,
            };
        }

        // `scores` is already in tie-break order: first at the max wins.
        let top: Vec<&String> = scores
            .iter()
            .filter(|(_, s)| *s == best)
            .map(|(name, _)| name)
            .collect();
        let domain = top[0].clone();
        let ambiguous = top.len() > 1;

        Classification {
            domain,
            score: best,
            ambiguous,
            scores,
        }
    }

    pub fn default_domain(&self) -> &str {
        &self.default_domain
    }

    /// Domain names in tie-break order.
    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.domains.iter().map(|d| d.name.as_str())
    }
}
