//! Routing: classify a task, pick a tier, pick a worker.

pub mod classifier;
pub mod mode;
pub mod patterns;
pub mod router;
pub mod team;
pub mod tier;

pub use classifier::{Classification, DomainClassifier, DomainSpec, GENERAL_DOMAIN};
pub use mode::{ExecutionMode, ModeSelector};
pub use patterns::{PatternSet, PatternSpec};
pub use router::{MatchReason, MatchStrategy, Route, Router, RoutingDecision};
pub use team::{Team, TeamMemberSpec, TeamRouter, TeamSpec};
pub use tier::{TierSelector, TierSpec};
