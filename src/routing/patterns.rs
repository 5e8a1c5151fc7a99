//! Weighted pattern sets shared by the classifiers.
//!
//! A pattern contributes its weight once if it matches anywhere in the text,
//! no matter how often it occurs, so a repeated keyword cannot run away with
//! the score.

use crate::error::{Error, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Pattern as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSpec {
    /// Regular expression, matched case-insensitively.
    pub pattern: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

impl PatternSpec {
    pub fn new(pattern: &str, weight: u32) -> Self {
        Self {
            pattern: pattern.to_string(),
            weight,
        }
    }
}

/// Shorthand for building weighted pattern tables in code.
pub fn specs(table: &[(&str, u32)]) -> Vec<PatternSpec> {
    table
        .iter()
        .map(|(pattern, weight)| PatternSpec::new(pattern, *weight))
        .collect()
}

#[derive(Debug, Clone)]
pub struct WeightedPattern {
    regex: Regex,
    weight: u32,
}

impl WeightedPattern {
    pub fn compile(spec: &PatternSpec) -> Result<Self> {
        let regex = RegexBuilder::new(&spec.pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| Error::InvalidPattern {
                pattern: spec.pattern.clone(),
                source,
            })?;
        Ok(Self {
            regex,
            weight: spec.weight,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// An ordered list of weighted patterns.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<WeightedPattern>,
}

impl PatternSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile every spec; the first invalid regex aborts construction.
    pub fn compile(specs: &[PatternSpec]) -> Result<Self> {
        let patterns = specs
            .iter()
            .map(WeightedPattern::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Sum of the weights of all matching patterns, each counted once.
    /// Saturates at `u32::MAX`.
    pub fn score(&self, text: &str) -> u32 {
        self.patterns
            .iter()
            .filter(|p| p.is_match(text))
            .map(WeightedPattern::weight)
            .fold(0, u32::saturating_add)
    }

    /// Patterns that match, in table order.
    pub fn matching<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a WeightedPattern> {
        self.patterns.iter().filter(move |p| p.is_match(text))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
