//! Outbound events.
//!
//! An [`Event`] is the only thing the relay ever pushes to a connection.
//! Chat messages are additionally retained in the history buffer.
//! Events are immutable once built.

use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Error;
use crate::now_millis;
use crate::roster::Identity;

/// Length of the random suffix of an event id.
const ID_SUFFIX_LEN: usize = 9;

/// Unique event identifier, `msg_<unix-millis>_<suffix>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Generate a fresh id stamped with the given time.
    pub fn generate(timestamp: u64) -> Self {
        let suffix: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(ID_SUFFIX_LEN)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();
        Self(format!("msg_{timestamp}_{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a chat message came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Typed by a participant over a live connection.
    #[default]
    Interactive,
    /// Injected by a non-interactive producer over the HTTP API.
    Api,
}

impl Source {
    pub fn is_interactive(&self) -> bool {
        matches!(self, Source::Interactive)
    }
}

/// A chat message as broadcast and stored in history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: EventId,
    /// Sender's roster key.
    pub sender: String,
    /// Snapshot of the sender's roster entry for display.
    pub sender_info: Identity,
    /// Trimmed message text.
    pub message: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub pinned: bool,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Source::is_interactive")]
    pub source: Source,
}

impl ChatMessage {
    /// Build a message from already-validated text, stamping id and time.
    pub fn new(
        sender: &Identity,
        message: String,
        tags: Vec<String>,
        pinned: bool,
        source: Source,
    ) -> Self {
        let timestamp = now_millis();
        Self {
            id: EventId::generate(timestamp),
            sender: sender.key.clone(),
            sender_info: sender.clone(),
            message,
            tags,
            pinned,
            timestamp,
            source,
        }
    }
}

/// Display snapshot of one connection: identity plus timestamps, never the
/// transport handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub session_id: String,
    pub identity: String,
    pub team_member: Identity,
    pub connected_at: u64,
    pub last_seen: u64,
}

/// Events pushed to connections (JSON framing, `type` tag).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Event {
    /// Sent once to every new transport session.
    ConnectionEstablished {
        message: String,
        session_id: String,
        timestamp: u64,
    },

    /// Reply to a successful `identify`.
    IdentificationConfirmed {
        identity: String,
        team_member: Identity,
        connected_users: Vec<ConnectionInfo>,
        history: Vec<ChatMessage>,
        timestamp: u64,
    },

    /// Another connection identified.
    UserConnected {
        user: String,
        team_member: Identity,
        connected_users: Vec<ConnectionInfo>,
        timestamp: u64,
    },

    /// An identified connection closed.
    UserDisconnected {
        user: String,
        connected_users: Vec<ConnectionInfo>,
        timestamp: u64,
    },

    ChatMessage(ChatMessage),

    TypingIndicator {
        user: String,
        is_typing: bool,
        timestamp: u64,
    },

    /// Tail of the history buffer, oldest first.
    MessageHistory {
        messages: Vec<ChatMessage>,
        timestamp: u64,
    },

    Pong {
        timestamp: u64,
    },

    Error {
        kind: String,
        message: String,
    },
}

impl Event {
    /// Error reply for a rejected request.
    pub fn error(err: &Error) -> Self {
        Event::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }

    /// The `type` tag this event serializes with.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::ConnectionEstablished { .. } => "connection_established",
            Event::IdentificationConfirmed { .. } => "identification_confirmed",
            Event::UserConnected { .. } => "user_connected",
            Event::UserDisconnected { .. } => "user_disconnected",
            Event::ChatMessage(_) => "chat_message",
            Event::TypingIndicator { .. } => "typing_indicator",
            Event::MessageHistory { .. } => "message_history",
            Event::Pong { .. } => "pong",
            Event::Error { .. } => "error",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::Roster;
    use serde_json::Value;

    #[test]
    fn event_id_shape() {
        let id = EventId::generate(1_700_000_000_000);
        let s = id.as_str();
        assert!(s.starts_with("msg_1700000000000_"));
        let suffix = s.rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), ID_SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn event_ids_differ() {
        assert_ne!(EventId::generate(1), EventId::generate(1));
    }

    #[test]
    fn chat_message_wire_format() {
        let roster = Roster::crew();
        let heather = roster.resolve("heather").unwrap();
        let msg = ChatMessage::new(heather, "hello".into(), vec!["idea".into()], true, Source::Interactive);
        let json: Value = serde_json::from_str(&Event::ChatMessage(msg.clone()).to_json().unwrap()).unwrap();

        assert_eq!(json["type"], "chat_message");
        assert_eq!(json["sender"], "heather");
        assert_eq!(json["senderInfo"]["name"], "Heather");
        assert_eq!(json["message"], "hello");
        assert_eq!(json["tags"][0], "idea");
        assert_eq!(json["pinned"], true);
        assert_eq!(json["id"], msg.id.as_str());
        // Interactive messages carry no source label.
        assert!(json.get("source").is_none());
    }

    #[test]
    fn injected_message_is_labelled() {
        let roster = Roster::crew();
        let emmy = roster.resolve("emmy").unwrap();
        let msg = ChatMessage::new(emmy, "hi".into(), Vec::new(), false, Source::Api);
        let json: Value = serde_json::to_value(Event::ChatMessage(msg)).unwrap();
        assert_eq!(json["source"], "api");
    }

    #[test]
    fn struct_variants_use_camel_case_fields() {
        let json: Value = serde_json::to_value(Event::TypingIndicator {
            user: "G".into(),
            is_typing: true,
            timestamp: 5,
        })
        .unwrap();
        assert_eq!(json["type"], "typing_indicator");
        assert_eq!(json["isTyping"], true);
    }

    #[test]
    fn error_event_carries_code_and_reason() {
        let event = Event::error(&Error::EmptyMessage);
        assert_eq!(event.kind(), "error");
        let json: Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "empty_message");
        assert_eq!(json["message"], "message is required");
    }
}
