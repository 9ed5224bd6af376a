//! WebSocket message types.
//!
//! Outbound frames are chat turns. Inbound frames are opaque JSON; only the
//! `type` field is inspected, to route thoughts away from regular messages.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `type` value that routes an inbound frame to the thoughts callback
pub const THOUGHTS_TYPE: &str = "thoughts";

/// Chat turn sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub text: String,
    pub include_thoughts: bool,
    /// ISO-8601 UTC with millisecond precision, e.g. `2024-05-01T09:30:00.000Z`
    pub timestamp: String,
}

impl OutboundMessage {
    pub fn new(text: impl Into<String>, include_thoughts: bool) -> Self {
        Self {
            text: text.into(),
            include_thoughts,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Inbound frame after routing
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// `data` field of a `{"type":"thoughts", ...}` envelope (null if absent)
    Thoughts(Value),
    /// Any other JSON value, passed through whole
    Message(Value),
}

impl InboundFrame {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Value>(text).map(Self::classify)
    }

    pub fn parse_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice::<Value>(data).map(Self::classify)
    }

    pub fn classify(value: Value) -> Self {
        match value {
            Value::Object(mut envelope)
                if envelope.get("type").and_then(Value::as_str) == Some(THOUGHTS_TYPE) =>
            {
                InboundFrame::Thoughts(envelope.remove("data").unwrap_or(Value::Null))
            }
            other => InboundFrame::Message(other),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InboundFrame::Thoughts(_) => "thoughts",
            InboundFrame::Message(_) => "message",
        }
    }
}
