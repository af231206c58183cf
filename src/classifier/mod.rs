//! Deciding whether and how to respond to a reply.
//!
//! [`classify`] is a pure function over the event and the rule set: no I/O,
//! no mutation, fully deterministic. That keeps the decision logic trivially
//! unit-testable and safe to call from the hot ingestion path.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::ReplyEvent;

pub mod render;
pub mod rules;

pub use render::{RenderError, render_template};
pub use rules::{ReplyRule, RuleError, RuleSet};

/// Why a reply was ignored.
pub const REASON_NO_RULE: &str = "no-rule-matched";
/// Why a reply with a matching rule was still ignored.
pub const REASON_RENDER_FAILED: &str = "render-failed";

/// The classification decision for one reply event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionDecision {
    /// Post an automated response.
    Respond {
        /// Priority of the winning rule (for audit logs).
        rule_priority: i32,
        /// The fully rendered response text.
        rendered: String,
    },

    /// Do nothing; `reason` lands in the ledger record.
    Ignore { reason: String },
}

impl ActionDecision {
    fn ignore(reason: &str) -> Self {
        ActionDecision::Ignore {
            reason: reason.to_string(),
        }
    }
}

/// Classifies a reply event against the rule set.
///
/// Rules are evaluated in priority order; the first match wins. A matching
/// rule whose template fails to render degrades to `Ignore` rather than an
/// error: one bad rule must never abort ingestion for unrelated replies.
pub fn classify(event: &ReplyEvent, rules: &RuleSet) -> ActionDecision {
    let Some(rule) = rules.best_match(&event.text) else {
        return ActionDecision::ignore(REASON_NO_RULE);
    };

    match render_template(&rule.response_template, event) {
        Ok(rendered) => ActionDecision::Respond {
            rule_priority: rule.priority,
            rendered,
        },
        Err(e) => {
            debug!(
                reply_id = %event.reply_id,
                pattern = %rule.pattern,
                error = %e,
                "Template render failed; ignoring reply"
            );
            ActionDecision::ignore(REASON_RENDER_FAILED)
        }
    }
}
