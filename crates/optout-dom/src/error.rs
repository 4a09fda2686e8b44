//! DOM error types

use thiserror::Error;

/// A matcher pattern could not be evaluated
#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Unsupported selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Rule error: {0}")]
    Rule(#[from] optout_rules::RuleError),
}

/// Activating (clicking) an element failed
#[derive(Error, Debug)]
pub enum ActivationError {
    #[error("Element is no longer attached to the document")]
    Detached,

    #[error("Activation rejected by host: {0}")]
    Rejected(String),
}
