//! Inbound envelopes.
//!
//! Clients send JSON objects tagged by `type`. The tag is read first into a
//! [`RawEnvelope`]. Known kinds then decode into a typed variant; anything
//! else is kept as [`Envelope::Unrecognized`] with the raw payload so the
//! caller can reply with an error naming the kind.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// One decoded inbound request.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Identify {
        identity: String,
        session_id: Option<String>,
    },
    ChatMessage {
        message: String,
        session_id: Option<String>,
        tags: Vec<String>,
        pinned: bool,
    },
    TypingIndicator {
        session_id: Option<String>,
        is_typing: bool,
    },
    RequestHistory,
    Ping,
    Unrecognized {
        kind: String,
        raw: Value,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentifyFields {
    identity: String,
    #[serde(default, alias = "clientId")]
    session_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatFields {
    message: String,
    #[serde(default, alias = "clientId")]
    session_id: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    pinned: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypingFields {
    #[serde(default, alias = "clientId")]
    session_id: Option<String>,
    #[serde(default)]
    is_typing: bool,
}

/// A JSON object with a string `type`, body not yet decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEnvelope {
    kind: String,
    value: Value,
}

impl RawEnvelope {
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| Error::MalformedEnvelope(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::MalformedEnvelope("missing string field `type`".into()))?
            .to_string();
        Ok(Self { kind, value })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Whether this kind needs an identified connection, judged from the
    /// tag alone.
    pub fn requires_identity(&self) -> bool {
        matches!(self.kind.as_str(), "chat_message" | "typing_indicator")
    }

    /// Decode the body for the envelope's kind.
    pub fn decode(self) -> Result<Envelope> {
        let Self { kind, value } = self;
        let envelope = match kind.as_str() {
            "identify" => {
                let f: IdentifyFields = decode(value)?;
                Envelope::Identify {
                    identity: f.identity,
                    session_id: f.session_id,
                }
            }
            "chat_message" => {
                let f: ChatFields = decode(value)?;
                Envelope::ChatMessage {
                    message: f.message,
                    session_id: f.session_id,
                    tags: f.tags,
                    pinned: f.pinned,
                }
            }
            "typing_indicator" => {
                let f: TypingFields = decode(value)?;
                Envelope::TypingIndicator {
                    session_id: f.session_id,
                    is_typing: f.is_typing,
                }
            }
            "request_history" => Envelope::RequestHistory,
            "ping" => Envelope::Ping,
            _ => Envelope::Unrecognized { kind, raw: value },
        };
        Ok(envelope)
    }
}

impl Envelope {
    /// Decode one text frame.
    pub fn parse(text: &str) -> Result<Self> {
        RawEnvelope::parse(text)?.decode()
    }

    /// Decode an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        RawEnvelope::from_value(value)?.decode()
    }

    /// Whether handling this envelope requires an identified connection.
    pub fn requires_identity(&self) -> bool {
        matches!(
            self,
            Envelope::ChatMessage { .. } | Envelope::TypingIndicator { .. }
        )
    }

    /// Session id claimed by the envelope, if any.
    pub fn claimed_session(&self) -> Option<&str> {
        match self {
            Envelope::Identify { session_id, .. }
            | Envelope::ChatMessage { session_id, .. }
            | Envelope::TypingIndicator { session_id, .. } => session_id.as_deref(),
            _ => None,
        }
    }
}

fn decode<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::MalformedEnvelope(e.to_string()))
}
