//! Wire frames exchanged with clients and the event shape pushed to
//! group members.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::group::{GroupKey, GroupKind};

/// Keepalive frame sent on the ping interval, pre-serialized.
pub const PING_FRAME: &str = r#"{"type":"ping"}"#;

/// One-time acknowledgment sent right after a socket joins its group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelcomeFrame {
    /// Human-readable greeting naming the kind.
    pub message: String,
    /// The full group key the socket joined.
    pub group: String,
    /// The address the socket was accepted from, echoed back.
    pub client_ip: String,
}

impl WelcomeFrame {
    /// Build the welcome for a freshly joined connection.
    #[must_use]
    pub fn new(kind: GroupKind, group: &GroupKey, client_ip: &str) -> Self {
        Self {
            message: format!("Connected to {} WebSocket", kind.as_str()),
            group: group.as_str().to_string(),
            client_ip: client_ip.to_string(),
        }
    }
}

/// Inbound client frame, classified by its declared `type`.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// `{"type":"ready", ...}` — the client signals readiness; the full
    /// payload is carried so it can be re-published verbatim.
    Ready(Value),
    /// Any other declared type (or none), ignored by the session.
    Other(Option<String>),
}

impl InboundFrame {
    /// Classify a raw text frame. Errors when the text is not valid JSON.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(raw)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_owned);
        Ok(match kind.as_deref() {
            Some("ready") => InboundFrame::Ready(value),
            _ => InboundFrame::Other(kind),
        })
    }
}

/// Envelope published to the group channel when a client reports ready.
///
/// Subscribers receive `{"type":"message","data":<original payload>}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyEnvelope {
    /// Always `"message"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The client's ready payload, untouched.
    pub data: Value,
}

impl ReadyEnvelope {
    /// Wrap a client payload for publication.
    #[must_use]
    pub fn wrap(payload: Value) -> Self {
        Self {
            kind: "message".to_string(),
            data: payload,
        }
    }
}

/// Structured event pushed to every member of a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayEvent {
    /// Unique event id.
    pub id: Uuid,
    /// Event category, `"event"` for server-produced log lines.
    #[serde(rename = "type")]
    pub kind: String,
    /// Who produced the event.
    pub sender: String,
    /// Producing module, e.g. `"whisper_api"`.
    pub module: String,
    /// Optional sub-scope within the module.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Human-readable event text.
    pub message: String,
    /// Additional top-level fields, flattened into the JSON object.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RelayEvent {
    /// Server-produced log event (`type: "event"`, `sender: "server"`).
    #[must_use]
    pub fn log(module: &str, scope: &str, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind: "event".to_string(),
            sender: "server".to_string(),
            module: module.to_string(),
            scope: Some(scope.to_string()),
            message: message.into(),
            extra: Map::new(),
        }
    }

    /// Attach an extra top-level field.
    #[must_use]
    pub fn with_extra(mut self, key: &str, value: Value) -> Self {
        let _ = self.extra.insert(key.to_string(), value);
        self
    }
}
