//! Core relay logic: per-connection dispatch over the shared registry and
//! history.
//!
//! All mutation of shared state happens under one lock, and broadcasts are
//! queued before the lock is released. Two chat messages that take the lock
//! in order A, B therefore reach every recipient in order A, B.

use std::time::Instant;

use crew_core::envelope::{Envelope, RawEnvelope};
use crew_core::event::{ChatMessage, ConnectionInfo, Event, Source};
use crew_core::extract::extract_message;
use crew_core::history::HistoryBuffer;
use crew_core::roster::Roster;
use crew_core::{Error, Result, now_millis};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::fanout::{broadcast, send_to};
use crate::registry::{ConnectionRegistry, Outbound};

/// Chat previews in logs are cut to this many characters.
const LOG_PREVIEW_CHARS: usize = 50;

/// Greeting carried by `connection_established`.
const WELCOME: &str = "Connected to crew chat";

/// Registry and history, guarded together.
struct Shared {
    registry: ConnectionRegistry,
    history: HistoryBuffer,
}

impl Shared {
    /// Append a chat message to history and broadcast it to everyone,
    /// sender included.
    fn publish(&mut self, message: ChatMessage) -> usize {
        self.history.append(message.clone());
        broadcast(&self.registry, &Event::ChatMessage(message), None)
    }
}

/// Read-only counters for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    /// Identified connections.
    pub active_connections: usize,
    /// All registered connections.
    pub total_connections: usize,
    pub history_length: usize,
}

/// Shared relay state.
pub struct RelayState {
    roster: Roster,
    shared: Mutex<Shared>,
    /// How many history entries are replayed to a client.
    replay: usize,
    /// Server start time (for uptime reporting).
    pub start_time: Instant,
}

impl RelayState {
    pub fn new(roster: Roster, history_capacity: usize, replay: usize) -> Self {
        Self {
            roster,
            shared: Mutex::new(Shared {
                registry: ConnectionRegistry::new(),
                history: HistoryBuffer::new(history_capacity),
            }),
            replay,
            start_time: Instant::now(),
        }
    }

    pub fn from_config(config: &RelayConfig, roster: Roster) -> Self {
        Self::new(roster, config.history_capacity, config.history_replay)
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Register a new transport session and greet it.
    pub async fn connect(&self, session_id: &str, outbound: Outbound) -> Result<()> {
        let mut shared = self.shared.lock().await;
        let conn = shared.registry.register(session_id, outbound)?;
        send_to(
            conn.outbound(),
            &Event::ConnectionEstablished {
                message: WELCOME.to_string(),
                session_id: session_id.to_string(),
                timestamp: now_millis(),
            },
        );
        info!("New connection: {session_id}");
        Ok(())
    }

    /// Decode and dispatch one inbound text frame. Errors are replied to the
    /// sending connection and never close it.
    pub async fn handle_text(&self, session_id: &str, text: &str) {
        if let Err(e) = self.decode_and_dispatch(session_id, text).await {
            warn!("Rejected envelope from {session_id}: {e}");
            self.reply_error(session_id, &e).await;
        }
    }

    /// Identification is checked on the envelope kind, before the body is
    /// decoded.
    async fn decode_and_dispatch(&self, session_id: &str, text: &str) -> Result<()> {
        let raw = RawEnvelope::parse(text)?;
        if raw.requires_identity() {
            self.ensure_identified(session_id).await?;
        }
        self.dispatch(session_id, raw.decode()?).await
    }

    async fn ensure_identified(&self, session_id: &str) -> Result<()> {
        let shared = self.shared.lock().await;
        let conn = shared
            .registry
            .get(session_id)
            .ok_or_else(|| Error::UnknownSession(session_id.to_string()))?;
        if conn.is_active() { Ok(()) } else { Err(Error::NotIdentified) }
    }

    /// Apply one envelope on behalf of `session_id`.
    pub async fn dispatch(&self, session_id: &str, envelope: Envelope) -> Result<()> {
        let mut guard = self.shared.lock().await;
        let shared = &mut *guard;

        let (outbound, identity) = {
            let conn = shared
                .registry
                .get(session_id)
                .ok_or_else(|| Error::UnknownSession(session_id.to_string()))?;
            (conn.outbound().clone(), conn.identity.clone())
        };

        if let Some(claimed) = envelope.claimed_session() {
            if claimed != session_id {
                return Err(Error::UnknownSession(claimed.to_string()));
            }
        }
        if envelope.requires_identity() && identity.is_none() {
            return Err(Error::NotIdentified);
        }

        match envelope {
            Envelope::Identify { identity: key, .. } => {
                // Switching to another key announces the new one only. The
                // old key gets no user_disconnected and its history keeps
                // the old sender.
                let member = self.roster.resolve(&key)?.clone();
                shared.registry.identify(session_id, &key, &self.roster)?;
                info!("{key} identified on {session_id}");

                let connected_users = shared.registry.list_active(&self.roster);
                send_to(
                    &outbound,
                    &Event::IdentificationConfirmed {
                        identity: key.clone(),
                        team_member: member.clone(),
                        connected_users: connected_users.clone(),
                        history: shared.history.tail(self.replay),
                        timestamp: now_millis(),
                    },
                );
                broadcast(
                    &shared.registry,
                    &Event::UserConnected {
                        user: key,
                        team_member: member,
                        connected_users,
                        timestamp: now_millis(),
                    },
                    Some(session_id),
                );
            }

            Envelope::ChatMessage {
                message,
                tags,
                pinned,
                ..
            } => {
                let text = message.trim();
                if text.is_empty() {
                    return Err(Error::EmptyMessage);
                }
                let key = identity.ok_or(Error::NotIdentified)?;
                let sender = self.roster.resolve(&key)?;
                let chat = ChatMessage::new(sender, text.to_string(), tags, pinned, Source::Interactive);
                info!("Message from {key}: {}", preview(&chat.message));

                shared.registry.touch(session_id)?;
                shared.publish(chat);
            }

            Envelope::TypingIndicator { is_typing, .. } => {
                let key = identity.ok_or(Error::NotIdentified)?;
                debug!("{key} typing={is_typing}");
                broadcast(
                    &shared.registry,
                    &Event::TypingIndicator {
                        user: key,
                        is_typing,
                        timestamp: now_millis(),
                    },
                    Some(session_id),
                );
            }

            Envelope::RequestHistory => {
                send_to(
                    &outbound,
                    &Event::MessageHistory {
                        messages: shared.history.tail(self.replay),
                        timestamp: now_millis(),
                    },
                );
            }

            Envelope::Ping => {
                shared.registry.touch(session_id)?;
                send_to(&outbound, &Event::Pong { timestamp: now_millis() });
            }

            Envelope::Unrecognized { kind, .. } => {
                return Err(Error::UnknownEnvelopeKind(kind));
            }
        }
        Ok(())
    }

    /// Remove a closed session. Announces the departure if it had identified.
    ///
    /// Returns whether a `user_disconnected` event was broadcast.
    pub async fn disconnect(&self, session_id: &str) -> bool {
        let mut shared = self.shared.lock().await;
        let conn = match shared.registry.remove(session_id) {
            Ok(conn) => conn,
            Err(e) => {
                debug!("Disconnect ignored: {e}");
                return false;
            }
        };

        let Some(user) = conn.identity else {
            info!("Connection closed before identifying: {session_id}");
            return false;
        };
        info!("{user} disconnected ({session_id})");

        let connected_users = shared.registry.list_active(&self.roster);
        broadcast(
            &shared.registry,
            &Event::UserDisconnected {
                user,
                connected_users,
                timestamp: now_millis(),
            },
            None,
        );
        true
    }

    /// Inject a chat message from a non-interactive producer.
    ///
    /// Follows the same append and broadcast path as interactive chat, with
    /// the message labelled [`Source::Api`].
    pub async fn submit(&self, identity: &str, payload: &Value, tags: Vec<String>) -> Result<ChatMessage> {
        let sender = self.roster.resolve(identity)?;
        let text = extract_message(payload)?;
        let chat = ChatMessage::new(sender, text, tags, false, Source::Api);
        info!("Injected message from {identity}: {}", preview(&chat.message));

        self.shared.lock().await.publish(chat.clone());
        Ok(chat)
    }

    pub async fn health(&self) -> Health {
        let shared = self.shared.lock().await;
        Health {
            active_connections: shared.registry.active_count(),
            total_connections: shared.registry.len(),
            history_length: shared.history.len(),
        }
    }

    /// Snapshots of identified connections.
    pub async fn active_connections(&self) -> Vec<ConnectionInfo> {
        self.shared.lock().await.registry.list_active(&self.roster)
    }

    /// Up to `limit` messages appended after cursor `after`, oldest first,
    /// and the cursor to poll from next.
    pub async fn history_page(&self, after: usize, limit: usize) -> (Vec<ChatMessage>, usize) {
        self.shared.lock().await.history.page(after, limit)
    }

    /// Send an `error` event to one connection. The connection stays open.
    pub async fn reply_error(&self, session_id: &str, err: &Error) {
        let shared = self.shared.lock().await;
        if let Some(conn) = shared.registry.get(session_id) {
            send_to(conn.outbound(), &Event::error(err));
        }
    }
}

fn preview(text: &str) -> String {
    text.chars().take(LOG_PREVIEW_CHARS).collect()
}
