//! Matcher pattern parsing
//!
//! A rule matcher is either a structural selector handed to the host's query
//! engine, or `<scope>:contains("<text>")`, which selects elements matching
//! `<scope>` whose rendered text contains `<text>` (case-insensitive).

use crate::error::RuleError;
use crate::Result;

const CONTAINS_MARKER: &str = ":contains(";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatcherPattern {
    /// Native selector syntax
    Structural(String),
    /// Text filter over a scope; `scope` is `None` when the pattern starts
    /// with `:contains(` directly
    ContainsText {
        scope: Option<String>,
        /// Lower-cased target text
        text: String,
    },
}

impl MatcherPattern {
    /// Parse a raw rule matcher.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(RuleError::MalformedPattern("empty matcher".to_string()));
        }

        let Some(idx) = raw.find(CONTAINS_MARKER) else {
            return Ok(MatcherPattern::Structural(raw.to_string()));
        };

        let scope = raw[..idx].trim();
        let rest = &raw[idx + CONTAINS_MARKER.len()..];

        let inner = rest
            .strip_suffix(')')
            .map(str::trim)
            .ok_or_else(|| RuleError::MalformedPattern(raw.to_string()))?;

        let text = strip_quotes(inner).ok_or_else(|| RuleError::MalformedPattern(raw.to_string()))?;
        if text.trim().is_empty() {
            return Err(RuleError::MalformedPattern(raw.to_string()));
        }

        // Nested or chained :contains() is not supported
        if scope.contains(CONTAINS_MARKER) || text.contains(CONTAINS_MARKER) {
            return Err(RuleError::MalformedPattern(raw.to_string()));
        }

        Ok(MatcherPattern::ContainsText {
            scope: if scope.is_empty() {
                None
            } else {
                Some(scope.to_string())
            },
            text: text.to_lowercase(),
        })
    }

    pub fn is_text(&self) -> bool {
        matches!(self, MatcherPattern::ContainsText { .. })
    }
}

fn strip_quotes(inner: &str) -> Option<&str> {
    let first = inner.chars().next()?;
    if first != '"' && first != '\'' {
        return None;
    }
    if inner.len() < 2 || !inner.ends_with(first) {
        return None;
    }
    Some(&inner[1..inner.len() - 1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural() {
        let pattern = MatcherPattern::parse("#onetrust-reject-all-handler").unwrap();
        assert_eq!(
            pattern,
            MatcherPattern::Structural("#onetrust-reject-all-handler".to_string())
        );
        assert!(!pattern.is_text());
    }

    #[test]
    fn test_contains_with_scope() {
        let pattern = MatcherPattern::parse(r#"button:contains("Reject all")"#).unwrap();
        assert_eq!(
            pattern,
            MatcherPattern::ContainsText {
                scope: Some("button".to_string()),
                text: "reject all".to_string(),
            }
        );
    }

    #[test]
    fn test_contains_single_quotes_without_scope() {
        let pattern = MatcherPattern::parse(":contains('Avslå')").unwrap();
        assert_eq!(
            pattern,
            MatcherPattern::ContainsText {
                scope: None,
                text: "avslå".to_string(),
            }
        );
    }

    #[test]
    fn test_contains_text_with_parenthesis() {
        let pattern = MatcherPattern::parse(r#"a:contains("Refuse (all)")"#).unwrap();
        assert_eq!(
            pattern,
            MatcherPattern::ContainsText {
                scope: Some("a".to_string()),
                text: "refuse (all)".to_string(),
            }
        );
    }

    #[test]
    fn test_malformed_contains() {
        assert!(MatcherPattern::parse(r#"button:contains("Reject all""#).is_err());
        assert!(MatcherPattern::parse(r#"button:contains(Reject all)"#).is_err());
        assert!(MatcherPattern::parse(r#"button:contains("Reject')"#).is_err());
        assert!(MatcherPattern::parse(r#"button:contains("  ")"#).is_err());
        assert!(MatcherPattern::parse(r#"div:contains("a") button:contains("b")"#).is_err());
        assert!(MatcherPattern::parse("   ").is_err());
    }
}
