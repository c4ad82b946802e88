//! Wire protocol types
//!
//! JSON shapes shared by the WebSocket stream, the history endpoints, and
//! the terminal client. Inbound frames are never trusted for identity or
//! time; the server re-stamps both before fan-out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Username reserved for server-generated notices.
pub const SYSTEM_USER: &str = "System";

/// A chat message as it appears on the wire and in history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub user: String,
    pub time: DateTime<Utc>,
    #[serde(rename = "message")]
    pub text: String,
}

impl ChatMessage {
    /// Build a message stamped with the server clock.
    pub fn now(user: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            time: Utc::now(),
            text: text.into(),
        }
    }

    /// Server-generated notice attributed to the System user.
    pub fn system(text: impl Into<String>) -> Self {
        Self::now(SYSTEM_USER, text)
    }
}

/// An inbound frame from a client. Only the text is read; any
/// client-supplied `user` or `time` field is discarded.
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    #[serde(default, rename = "message")]
    pub text: String,
}

/// Kind of lifecycle event recorded in the connection audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Connected,
    Disconnected,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

/// An audit row holds an event kind this build does not know.
#[derive(Debug, Error)]
#[error("unknown event kind: {0}")]
pub struct UnknownEventKind(pub String);

impl std::str::FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connected" => Ok(Self::Connected),
            "disconnected" => Ok(Self::Disconnected),
            _ => Err(UnknownEventKind(s.to_string())),
        }
    }
}

/// A recorded connect/disconnect event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionEvent {
    pub user: String,
    pub time: DateTime<Utc>,
    #[serde(rename = "event")]
    pub kind: EventKind,
}

/// Response body for the paginated message history endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub total: i64,
    pub messages: Vec<ChatMessage>,
}
