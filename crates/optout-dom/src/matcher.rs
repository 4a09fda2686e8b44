//! Element matcher
//!
//! Resolves a [`DeclineRule`] against a live [`Dom`]. Malformed or unsupported
//! patterns never propagate: they are logged at debug level and resolve to no
//! candidates.

use optout_rules::{DeclineRule, MatcherPattern};

use crate::dom::Dom;
use crate::error::MatchError;

/// Scope used for `:contains(...)` patterns that name none
pub const DEFAULT_TEXT_SCOPE: &str =
    "button, a, [role='button'], input[type='button'], input[type='submit']";

#[derive(Debug, Clone)]
pub struct ElementMatcher {
    default_scope: String,
}

impl ElementMatcher {
    pub fn new() -> Self {
        Self {
            default_scope: DEFAULT_TEXT_SCOPE.to_string(),
        }
    }

    pub fn with_default_scope(scope: impl Into<String>) -> Self {
        Self {
            default_scope: scope.into(),
        }
    }

    /// Candidate elements for a rule, in document order
    pub fn find<D: Dom>(&self, dom: &D, rule: &DeclineRule) -> Vec<D::Node> {
        match self.try_find(dom, &rule.matcher) {
            Ok(nodes) => nodes,
            Err(e) => {
                tracing::debug!(
                    rule = %rule.label,
                    matcher = %rule.matcher,
                    error = %e,
                    "Matcher produced no candidates"
                );
                Vec::new()
            }
        }
    }

    fn try_find<D: Dom>(&self, dom: &D, matcher: &str) -> Result<Vec<D::Node>, MatchError> {
        match MatcherPattern::parse(matcher)? {
            MatcherPattern::Structural(selector) => dom.query_all(&selector),
            MatcherPattern::ContainsText { scope, text } => {
                let scope = scope.as_deref().unwrap_or(self.default_scope.as_str());
                Ok(dom
                    .query_all(scope)?
                    .into_iter()
                    .filter(|node| dom.text_content(*node).to_lowercase().contains(&text))
                    .collect())
            }
        }
    }
}

impl Default for ElementMatcher {
    fn default() -> Self {
        Self::new()
    }
}
