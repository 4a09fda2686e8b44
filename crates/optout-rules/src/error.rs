//! Rule error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Rule catalog is empty")]
    EmptyCatalog,

    #[error("Invalid rule at index {index}: {reason}")]
    InvalidRule { index: usize, reason: String },

    #[error("Malformed matcher pattern: {0}")]
    MalformedPattern(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
