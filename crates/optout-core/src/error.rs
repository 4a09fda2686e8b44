//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Rule error: {0}")]
    Rules(#[from] optout_rules::RuleError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] optout_messaging::ValidationError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// A third-party consent API call failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VendorApiError {
    #[error("Vendor API threw: {0}")]
    Threw(String),

    #[error("Malformed vendor response: {0}")]
    Malformed(String),

    #[error("Vendor API does not support {0}")]
    Unsupported(String),
}
