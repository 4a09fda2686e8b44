//! Inbound message validation
//!
//! Payloads arrive from other frames and are adversarial. Nothing reads a
//! field before [`InboundMessage::from_payload`] has produced a typed value.

use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::Result;

/// Property names that collide with object internals
const FORBIDDEN_KEYS: &[&str] = &[
    "__proto__",
    "constructor",
    "prototype",
    "__defineGetter__",
    "__defineSetter__",
    "__lookupGetter__",
    "__lookupSetter__",
    "hasOwnProperty",
    "isPrototypeOf",
    "propertyIsEnumerable",
    "toString",
    "toLocaleString",
    "valueOf",
];

/// Characters that are significant in markup or selectors
const STRIPPED_CHARS: &[char] = &['<', '>', '"', '\'', '&', '`', '\\'];

/// A raw `message` event as delivered by the host
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub origin: String,
    pub data: Value,
}

impl MessageEvent {
    pub fn new(origin: impl Into<String>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadLimits {
    /// Cap on serialized payload size
    pub max_bytes: usize,
    /// Cap on object/array nesting
    pub max_depth: usize,
    /// Cap on extracted string fields, in characters
    pub max_field_len: usize,
}

impl Default for PayloadLimits {
    fn default() -> Self {
        Self {
            max_bytes: 8192,
            max_depth: 8,
            max_field_len: 100,
        }
    }
}

/// The `choice` field: vendors send either a numeric code or a label
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    Code(i64),
    Label(String),
}

/// A payload that passed validation; string fields are sanitized
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InboundMessage {
    pub name: Option<String>,
    pub kind: Option<String>,
    pub choice: Option<Choice>,
}

impl InboundMessage {
    pub fn from_payload(data: &Value, limits: &PayloadLimits) -> Result<Self> {
        let Value::Object(map) = data else {
            return Err(ValidationError::NotAnObject);
        };

        let size = serde_json::to_vec(data).map(|v| v.len()).unwrap_or(usize::MAX);
        if size > limits.max_bytes {
            return Err(ValidationError::TooLarge {
                limit: limits.max_bytes,
            });
        }

        check_keys(map, 1, limits.max_depth)?;

        let name = string_field(map, "name", limits)?;
        let kind = string_field(map, "type", limits)?;
        let choice = match map.get("choice") {
            None => None,
            Some(Value::Number(n)) => Some(Choice::Code(
                n.as_i64()
                    .ok_or(ValidationError::WrongType { field: "choice" })?,
            )),
            Some(Value::String(s)) => Some(Choice::Label(sanitize(s, limits.max_field_len))),
            Some(_) => return Err(ValidationError::WrongType { field: "choice" }),
        };

        Ok(Self { name, kind, choice })
    }

    /// `name` and `type`, whichever are present
    pub fn event_names(&self) -> impl Iterator<Item = &str> {
        self.name.iter().chain(self.kind.iter()).map(String::as_str)
    }
}

fn string_field(
    map: &Map<String, Value>,
    field: &'static str,
    limits: &PayloadLimits,
) -> Result<Option<String>> {
    match map.get(field) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(sanitize(s, limits.max_field_len))),
        Some(_) => Err(ValidationError::WrongType { field }),
    }
}

fn check_keys(map: &Map<String, Value>, depth: usize, max_depth: usize) -> Result<()> {
    if depth > max_depth {
        return Err(ValidationError::TooDeep { limit: max_depth });
    }

    for (key, value) in map {
        if FORBIDDEN_KEYS.contains(&key.as_str()) {
            return Err(ValidationError::ForbiddenKey(sanitize(key, 32)));
        }
        check_value(value, depth, max_depth)?;
    }

    Ok(())
}

fn check_value(value: &Value, depth: usize, max_depth: usize) -> Result<()> {
    match value {
        Value::Object(inner) => check_keys(inner, depth + 1, max_depth),
        Value::Array(items) => {
            if depth + 1 > max_depth {
                return Err(ValidationError::TooDeep { limit: max_depth });
            }
            items
                .iter()
                .try_for_each(|item| check_value(item, depth + 1, max_depth))
        }
        _ => Ok(()),
    }
}

/// Strip markup-significant and control characters and cap the length
pub fn sanitize(input: &str, max_len: usize) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() && !STRIPPED_CHARS.contains(c))
        .take(max_len)
        .collect::<String>()
        .trim()
        .to_string()
}
