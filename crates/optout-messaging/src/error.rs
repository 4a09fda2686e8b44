//! Messaging error types

use thiserror::Error;

/// Why an inbound message was dropped
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Untrusted origin: {0}")]
    UntrustedOrigin(String),

    #[error("Message originated from this instance")]
    SelfMessage,

    #[error("Payload is not a plain object")]
    NotAnObject,

    #[error("Forbidden property name: {0}")]
    ForbiddenKey(String),

    #[error("Field {field} has the wrong type")]
    WrongType { field: &'static str },

    #[error("Payload exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("Payload nesting exceeds depth {limit}")]
    TooDeep { limit: usize },

    #[error("Invalid page origin: {0}")]
    InvalidPageOrigin(String),
}

/// An outbound message could not be sent
#[derive(Error, Debug)]
pub enum SendError {
    #[error("Refusing to post to wildcard target origin")]
    WildcardTarget,

    #[error("Message channel unavailable: {0}")]
    Channel(String),
}
