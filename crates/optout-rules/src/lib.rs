//! Optout Rule Catalog
//!
//! Static, ordered knowledge about how cookie-consent prompts look:
//! - Decline rules (structural framework selectors and per-language text rules)
//! - `:contains("...")` matcher pattern parsing
//! - Keyword sets used to confirm or rule out cookie relevance
//!
//! Rules are ordered most specific first; the generic fallback is always last.

mod catalog;
mod error;
mod keywords;
mod pattern;

pub use catalog::{DeclineRule, RuleCatalog};
pub use error::RuleError;
pub use keywords::KeywordSet;
pub use pattern::MatcherPattern;

pub type Result<T> = std::result::Result<T, RuleError>;
