//! Error types for crew-core.
//!
//! Every variant is recoverable: the relay turns it into an `error` reply
//! to whoever sent the offending request and keeps the connection open.

use thiserror::Error;

/// Errors that can occur while handling an envelope or an injected message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("unknown message type: {0}")]
    UnknownEnvelopeKind(String),

    #[error("client not identified")]
    NotIdentified,

    #[error("invalid team member identity: {0}")]
    UnknownIdentity(String),

    #[error("message is required")]
    EmptyMessage,

    #[error("no message text found in payload")]
    NoExtractableMessage,

    #[error("unknown session: {0}")]
    UnknownSession(String),

    #[error("session already registered: {0}")]
    DuplicateSession(String),
}

impl Error {
    /// Stable machine-readable code carried in `error` replies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::MalformedEnvelope(_) => "malformed_envelope",
            Error::UnknownEnvelopeKind(_) => "unknown_envelope_kind",
            Error::NotIdentified => "not_identified",
            Error::UnknownIdentity(_) => "unknown_identity",
            Error::EmptyMessage => "empty_message",
            Error::NoExtractableMessage => "no_extractable_message",
            Error::UnknownSession(_) => "unknown_session",
            Error::DuplicateSession(_) => "duplicate_session",
        }
    }
}

/// Result type alias for crew-core operations.
pub type Result<T> = std::result::Result<T, Error>;
