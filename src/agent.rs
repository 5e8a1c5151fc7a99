//! Workers ("agents") and the registry that holds the roster.
//!
//! The registry is built once from configuration and is read-only from then
//! on; routers and planners borrow it (or share it behind an `Arc`) and never
//! mutate it, so no locking is needed.

use crate::error::{Error, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Default similarity a fuzzy capability needs to match.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.8;

/// Weight an anchor match contributes to a capability score.
pub const ANCHOR_WEIGHT: u32 = 10;

/// Execution tier of a worker.
///
/// Lower tiers run first under the tier-barrier policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Tier {
    /// Tier 1: planning, coordination, review and QA.
    Orchestration = 1,
    /// Tier 2: domain leads; design and strategy.
    DomainLead = 2,
    /// Tier 3: specialists; implementation.
    Specialist = 3,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Orchestration, Tier::DomainLead, Tier::Specialist];

    pub fn level(self) -> u8 {
        self as u8
    }
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Specialist
    }
}

impl TryFrom<u8> for Tier {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Tier::Orchestration),
            2 => Ok(Tier::DomainLead),
            3 => Ok(Tier::Specialist),
            other => Err(format!("tier must be 1, 2 or 3 (got {})", other)),
        }
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> Self {
        tier.level()
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tier-{}", self.level())
    }
}

/// One way a worker can claim a task.
#[derive(Debug, Clone)]
pub enum CapabilityMatcher {
    /// Case-insensitive substring of the description.
    Keyword(String),
    /// Bigram similarity against a same-length word window of the description.
    Fuzzy { token: String, threshold: f64 },
    /// Regex that pins the task to this worker (e.g. an owner tag).
    Anchor(Regex),
}

impl CapabilityMatcher {
    pub fn keyword(token: &str) -> Self {
        CapabilityMatcher::Keyword(token.trim().to_lowercase())
    }

    pub fn fuzzy(token: &str, threshold: f64) -> Self {
        CapabilityMatcher::Fuzzy {
            token: token.trim().to_lowercase(),
            threshold,
        }
    }

    pub fn anchor(pattern: &str) -> Result<Self> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| Error::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(CapabilityMatcher::Anchor(regex))
    }

    /// Test against an already lowercased description.
    pub fn matches(&self, lowered: &str) -> bool {
        match self {
            CapabilityMatcher::Keyword(token) => !token.is_empty() && lowered.contains(token),
            CapabilityMatcher::Fuzzy { token, threshold } => {
                best_window_similarity(token, lowered) >= *threshold
            }
            CapabilityMatcher::Anchor(regex) => regex.is_match(lowered),
        }
    }

    pub fn weight(&self) -> u32 {
        match self {
            CapabilityMatcher::Anchor(_) => ANCHOR_WEIGHT,
            _ => 1,
        }
    }
}

/// Sørensen–Dice coefficient over character bigrams.
pub fn bigram_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let a_grams = bigrams(a);
    let b_grams = bigrams(b);
    if a_grams.is_empty() || b_grams.is_empty() {
        return 0.0;
    }

    let mut pool = b_grams.clone();
    let mut shared = 0usize;
    for gram in &a_grams {
        if let Some(pos) = pool.iter().position(|g| g == gram) {
            pool.swap_remove(pos);
            shared += 1;
        }
    }
    (2 * shared) as f64 / (a_grams.len() + b_grams.len()) as f64
}

fn bigrams(s: &str) -> Vec<(char, char)> {
    let chars: Vec<char> = s.chars().collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Best similarity between `token` and any window of the same word count.
fn best_window_similarity(token: &str, lowered: &str) -> f64 {
    let width = token.split_whitespace().count().max(1);
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|w| !w.is_empty())
        .collect();
    if words.len() < width {
        return 0.0;
    }
    words
        .windows(width)
        .map(|window| bigram_similarity(token, &window.join(" ")))
        .fold(0.0, f64::max)
}

/// A named executor with a tier, an optional domain and capabilities.
#[derive(Debug, Clone)]
pub struct Agent {
    pub role: String,
    pub capabilities: Vec<CapabilityMatcher>,
    pub tier: Tier,
    /// Reporting line; used for audit queries, never for routing.
    pub parent_role: Option<String>,
    pub domain: Option<String>,
}

impl Agent {
    pub fn new(role: &str, tier: Tier) -> Self {
        Self {
            role: role.to_string(),
            capabilities: Vec::new(),
            tier,
            parent_role: None,
            domain: None,
        }
    }

    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string());
        self
    }

    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent_role = Some(parent.to_string());
        self
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.capabilities
            .extend(keywords.iter().map(|k| CapabilityMatcher::keyword(k)));
        self
    }

    pub fn with_capability(mut self, matcher: CapabilityMatcher) -> Self {
        self.capabilities.push(matcher);
        self
    }

    /// Sum of weights of every matcher that fires on the description.
    pub fn capability_score(&self, description: &str) -> u32 {
        let lowered = description.to_lowercase();
        self.capabilities
            .iter()
            .filter(|m| m.matches(&lowered))
            .map(CapabilityMatcher::weight)
            .fold(0, u32::saturating_add)
    }

    pub fn can_handle(&self, description: &str) -> bool {
        self.capability_score(description) > 0
    }

    pub fn in_domain(&self, domain: &str) -> bool {
        self.domain.as_deref() == Some(domain)
    }
}

/// The fixed roster of workers, in registration order.
///
/// Registration order is the tie-break of last resort in routing.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    agents: Vec<Agent>,
    index: HashMap<String, usize>,
    default_role: String,
}

impl AgentRegistry {
    /// Build a registry.
    ///
    /// # Errors
    /// - [`Error::DuplicateAgent`] if two agents share a role
    /// - [`Error::UnknownAgent`] if `default_role` or a parent role is not registered
    pub fn new(agents: Vec<Agent>, default_role: &str) -> Result<Self> {
        let mut index = HashMap::with_capacity(agents.len());
        for (pos, agent) in agents.iter().enumerate() {
            if index.insert(agent.role.clone(), pos).is_some() {
                return Err(Error::DuplicateAgent(agent.role.clone()));
            }
        }

        if !index.contains_key(default_role) {
            return Err(Error::UnknownAgent(default_role.to_string()));
        }

        for agent in &agents {
            if let Some(parent) = &agent.parent_role {
                if !index.contains_key(parent) {
                    return Err(Error::UnknownAgent(parent.clone()));
                }
            }
        }

        let registry = Self {
            agents,
            index,
            default_role: default_role.to_string(),
        };

        if let Some(default) = registry.get(default_role) {
            if default.tier != Tier::Orchestration {
                warn!(
                    role = default_role,
                    tier = %default.tier,
                    "default worker is not a tier-1 orchestration worker"
                );
            }
        }

        Ok(registry)
    }

    pub fn get(&self, role: &str) -> Option<&Agent> {
        self.index.get(role).map(|&pos| &self.agents[pos])
    }

    pub fn contains(&self, role: &str) -> bool {
        self.index.contains_key(role)
    }

    /// The worker that receives tasks nothing else claims.
    pub fn default_agent(&self) -> &Agent {
        // Presence is checked in `new`.
        &self.agents[self.index[&self.default_role]]
    }

    pub fn default_role(&self) -> &str {
        &self.default_role
    }

    /// All workers in registration order.
    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.iter()
    }

    pub fn at_tier(&self, tier: Tier) -> impl Iterator<Item = &Agent> {
        self.agents.iter().filter(move |a| a.tier == tier)
    }

    pub fn children_of<'a>(&'a self, parent: &'a str) -> impl Iterator<Item = &'a Agent> {
        self.agents
            .iter()
            .filter(move |a| a.parent_role.as_deref() == Some(parent))
    }

    /// Registration position of a role.
    pub fn position(&self, role: &str) -> Option<usize> {
        self.index.get(role).copied()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
