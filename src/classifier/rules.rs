//! Reply-matching rules.
//!
//! Rules are read-only configuration, loaded once at startup from a JSON
//! file and held in an immutable [`RuleSet`]. Matching is a case-insensitive
//! substring test of `pattern` against the reply text. When several rules
//! match, the highest `priority` wins; equal priorities fall back to
//! declaration order in the file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One matching rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRule {
    /// Case-insensitive substring to look for in the reply text.
    pub pattern: String,

    /// Response template; see the render module for placeholder syntax.
    pub response_template: String,

    /// Higher priority wins. Defaults to 0.
    #[serde(default)]
    pub priority: i32,
}

/// Errors that can occur while loading rules.
#[derive(Debug, Error)]
pub enum RuleError {
    /// IO error reading the rules file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A rule had an empty pattern (would match everything by accident).
    #[error("rule {index} has an empty pattern")]
    EmptyPattern { index: usize },
}

/// An immutable, priority-ordered collection of rules.
///
/// The constructor sorts by descending priority with a stable sort, so
/// declaration order breaks ties and matching can scan front to back.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<ReplyRule>,
}

impl RuleSet {
    /// Builds a rule set from rules in declaration order.
    pub fn new(mut rules: Vec<ReplyRule>) -> Result<Self, RuleError> {
        if let Some(index) = rules.iter().position(|r| r.pattern.is_empty()) {
            return Err(RuleError::EmptyPattern { index });
        }

        rules.sort_by_key(|r| std::cmp::Reverse(r.priority));
        Ok(RuleSet { rules })
    }

    /// Loads rules from a JSON file containing an array of [`ReplyRule`]s.
    pub fn load(path: &Path) -> Result<Self, RuleError> {
        let bytes = std::fs::read(path)?;
        let rules: Vec<ReplyRule> = serde_json::from_slice(&bytes)?;
        Self::new(rules)
    }

    /// An empty rule set (everything is ignored).
    pub fn empty() -> Self {
        RuleSet { rules: Vec::new() }
    }

    /// Returns the winning rule for a reply text, if any.
    pub fn best_match(&self, text: &str) -> Option<&ReplyRule> {
        let haystack = text.to_lowercase();
        self.rules
            .iter()
            .find(|rule| haystack.contains(&rule.pattern.to_lowercase()))
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True if no rules are configured.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
