//! Cross-frame messenger

use serde_json::{json, Value};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::{SendError, ValidationError};
use crate::message::{sanitize, Choice, InboundMessage, MessageEvent, PayloadLimits};
use crate::origin::TrustedOriginRegistry;
use crate::Result;

/// `source` marker on every message this instance sends
pub const OUTBOUND_SOURCE: &str = "optout";
/// `type` of the notice posted once consent is resolved
pub const RESOLVED_TYPE: &str = "optout:resolved";
/// SourcePoint's numeric choice code for "reject all"
pub const SP_REJECT_ALL_CHOICE: i64 = 13;

const SHOWN_EVENTS: &[&str] = &[
    "sp.showmessage",
    "cmpuishown",
    "consent-ui-shown",
    "banner_shown",
];

const HIDDEN_EVENTS: &[&str] = &[
    "sp.hidemessage",
    "useractioncomplete",
    "consent-ui-hidden",
    "banner_hidden",
];

/// Outbound half of the host's messaging primitive
pub trait MessageSink {
    /// Post `data` to frames whose origin is exactly `target_origin`
    fn post_message(&mut self, data: Value, target_origin: &str) -> std::result::Result<(), SendError>;
}

/// What a validated message means for the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageSignal {
    /// A vendor prompt was rendered
    BannerShown { vendor: Option<String> },
    /// A vendor prompt went away; consent is resolved one way or another
    BannerHidden {
        vendor: Option<String>,
        reject_confirmed: bool,
    },
    /// Valid, but not a consent event we act on
    Ignored,
}

pub struct CrossFrameMessenger {
    registry: TrustedOriginRegistry,
    limits: PayloadLimits,
    issued_nonces: HashSet<String>,
}

impl CrossFrameMessenger {
    pub fn new(registry: TrustedOriginRegistry, limits: PayloadLimits) -> Self {
        Self {
            registry,
            limits,
            issued_nonces: HashSet::new(),
        }
    }

    pub fn registry(&self) -> &TrustedOriginRegistry {
        &self.registry
    }

    /// Apply the origin, self-message and payload gates, then interpret.
    pub fn receive(&self, event: &MessageEvent) -> Result<MessageSignal> {
        if !self.registry.is_trusted(&event.origin) {
            return Err(ValidationError::UntrustedOrigin(sanitize(
                &event.origin,
                self.limits.max_field_len,
            )));
        }

        if self.is_own_message(&event.data) {
            return Err(ValidationError::SelfMessage);
        }

        let message = InboundMessage::from_payload(&event.data, &self.limits)?;
        let vendor = self.registry.vendor_for(&event.origin).map(str::to_string);

        Ok(interpret(&message, vendor))
    }

    fn is_own_message(&self, data: &Value) -> bool {
        let Value::Object(map) = data else {
            return false;
        };

        if map.get("source").and_then(Value::as_str) == Some(OUTBOUND_SOURCE) {
            return true;
        }

        map.get("nonce")
            .and_then(Value::as_str)
            .is_some_and(|nonce| self.issued_nonces.contains(nonce))
    }

    /// Tell same-origin frames that consent has been resolved
    pub fn post_resolved(&mut self, sink: &mut dyn MessageSink) -> std::result::Result<(), SendError> {
        let target = self.registry.page_origin();
        if target == "*" || target == "null" {
            return Err(SendError::WildcardTarget);
        }

        let nonce = Uuid::new_v4().to_string();
        let data = json!({
            "source": OUTBOUND_SOURCE,
            "type": RESOLVED_TYPE,
            "nonce": nonce,
        });

        self.issued_nonces.insert(nonce);
        sink.post_message(data, &target)?;

        tracing::debug!(target_origin = %target, "Posted resolution notice");
        Ok(())
    }
}

fn interpret(message: &InboundMessage, vendor: Option<String>) -> MessageSignal {
    let matches = |events: &[&str]| {
        message
            .event_names()
            .any(|name| events.contains(&name.to_lowercase().as_str()))
    };

    if matches(HIDDEN_EVENTS) {
        let reject_confirmed = message.choice == Some(Choice::Code(SP_REJECT_ALL_CHOICE));
        return MessageSignal::BannerHidden {
            vendor,
            reject_confirmed,
        };
    }

    if matches(SHOWN_EVENTS) {
        return MessageSignal::BannerShown { vendor };
    }

    MessageSignal::Ignored
}
