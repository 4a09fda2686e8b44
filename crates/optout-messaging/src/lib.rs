//! Optout Cross-Frame Messaging
//!
//! Consent prompts are often rendered inside vendor iframes that talk to the
//! host page with `postMessage`. Every inbound event passes three gates, in
//! order, before anything reads its content:
//! 1. Origin: the page's own origin or a registered vendor host (strict allow-list)
//! 2. Self-message: our own outbound notices are ignored
//! 3. Payload: plain object, no prototype-internal keys, typed declared fields
//!
//! Outbound messages always carry an explicit target origin.

mod error;
mod message;
mod messenger;
mod origin;

pub use error::{SendError, ValidationError};
pub use message::{sanitize, Choice, InboundMessage, MessageEvent, PayloadLimits};
pub use messenger::{
    CrossFrameMessenger, MessageSignal, MessageSink, OUTBOUND_SOURCE, RESOLVED_TYPE,
    SP_REJECT_ALL_CHOICE,
};
pub use origin::TrustedOriginRegistry;

pub type Result<T> = std::result::Result<T, ValidationError>;
