//! Execution mode selection.
//!
//! Decides per task whether the simple backend is enough or the advanced
//! (multi-step, tool-using) backend should serve it. Indicators are weighted
//! patterns for multi-step workflows: sequencing words, numbered steps,
//! "and then" chains.

use crate::error::Result;
use crate::routing::patterns::{specs, PatternSet, PatternSpec};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Score a description needs before the advanced backend is chosen.
pub const DEFAULT_MODE_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Simple,
    Advanced,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Simple => write!(f, "simple"),
            ExecutionMode::Advanced => write!(f, "advanced"),
        }
    }
}

/// Built-in multi-step indicators.
pub fn default_mode_patterns() -> Vec<PatternSpec> {
    specs(&[
        (r"\bthen\b", 2),
        (r"\bafter that\b|\bafterwards\b", 2),
        (r"\bstep[- ]by[- ]step\b", 3),
        (r"\bmulti[- ]step\b|\bworkflow\b|\bpipeline\b", 3),
        (r"(^|\s)(1[.)]|step 1)\s", 2),
        (r"\b(refactor|migrate) (the )?(whole|entire|all)\b", 3),
        (r"\brun (the )?tests\b|\bverify\b", 1),
        (r"\bacross (multiple|several|all) (files|modules|services)\b", 3),
    ])
}

#[derive(Debug, Clone)]
pub struct ModeSelector {
    patterns: PatternSet,
    threshold: u32,
}

impl ModeSelector {
    pub fn new(patterns: &[PatternSpec], threshold: u32) -> Result<Self> {
        Ok(Self {
            patterns: PatternSet::compile(patterns)?,
            threshold,
        })
    }

    /// Selector that always answers [`ExecutionMode::Simple`].
    pub fn simple_only() -> Self {
        Self {
            patterns: PatternSet::new(),
            threshold: u32::MAX,
        }
    }

    pub fn select(&self, description: &str) -> ExecutionMode {
        if self.score(description) >= self.threshold {
            ExecutionMode::Advanced
        } else {
            ExecutionMode::Simple
        }
    }

    pub fn score(&self, description: &str) -> u32 {
        self.patterns.score(description)
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

impl Default for ModeSelector {
    fn default() -> Self {
        // Built-in table is static and known to compile.
        Self::new(&default_mode_patterns(), DEFAULT_MODE_THRESHOLD)
            .unwrap_or_else(|_| Self::simple_only())
    }
}
