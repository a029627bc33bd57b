//! Connection registry: session id → connection state.
//!
//! A connection is registered as soon as its transport opens and becomes
//! "active" once it has identified against the roster. Several connections
//! may share one identity (one participant on several devices).

use std::collections::HashMap;
use std::sync::Arc;

use crew_core::event::ConnectionInfo;
use crew_core::roster::Roster;
use crew_core::{Error, Result, now_millis};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

/// One serialized event, shared between all recipients of a broadcast.
pub type Frame = Arc<str>;

/// Frames a connection may have queued before new ones are dropped.
pub const OUTBOUND_CAPACITY: usize = 256;

/// Handle to a connection's outbound transport.
///
/// Sending never blocks: frames are queued for the connection's writer task,
/// so a slow socket only delays itself. The queue is bounded; once a reader
/// falls [`OUTBOUND_CAPACITY`] frames behind, further frames for it are
/// dropped until it catches up.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<Frame>,
}

impl Outbound {
    /// Create a handle and the receiver its writer task drains.
    pub fn channel() -> (Self, mpsc::Receiver<Frame>) {
        Self::with_capacity(OUTBOUND_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue a frame. Returns false if the writer has gone away or its queue
    /// is full.
    pub fn send(&self, frame: Frame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue full, dropping frame");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Live state for one transport session.
#[derive(Debug)]
pub struct Connection {
    pub session_id: String,
    /// Roster key, set once identified.
    pub identity: Option<String>,
    pub connected_at: u64,
    pub last_seen: u64,
    /// Position in identification order, used to order `list_active`.
    identified_seq: Option<u64>,
    outbound: Outbound,
}

impl Connection {
    pub fn is_active(&self) -> bool {
        self.identity.is_some()
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<String, Connection>,
    next_seq: u64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an unidentified connection. Session ids must be unique among live
    /// connections.
    pub fn register(&mut self, session_id: &str, outbound: Outbound) -> Result<&Connection> {
        if self.connections.contains_key(session_id) {
            return Err(Error::DuplicateSession(session_id.to_string()));
        }
        let now = now_millis();
        let conn = Connection {
            session_id: session_id.to_string(),
            identity: None,
            connected_at: now,
            last_seen: now,
            identified_seq: None,
            outbound,
        };
        Ok(self.connections.entry(session_id.to_string()).or_insert(conn))
    }

    /// Bind an identity to a connection.
    ///
    /// Repeating the same key is a no-op. A different key overwrites the
    /// previous one; the last identification wins.
    pub fn identify(&mut self, session_id: &str, key: &str, roster: &Roster) -> Result<&Connection> {
        roster.resolve(key)?;
        let conn = self
            .connections
            .get_mut(session_id)
            .ok_or_else(|| Error::UnknownSession(session_id.to_string()))?;

        if conn.identity.as_deref() != Some(key) {
            conn.identity = Some(key.to_string());
            conn.last_seen = now_millis();
            if conn.identified_seq.is_none() {
                conn.identified_seq = Some(self.next_seq);
                self.next_seq += 1;
            }
        }
        Ok(conn)
    }

    /// Update a connection's last-activity timestamp.
    pub fn touch(&mut self, session_id: &str) -> Result<()> {
        let conn = self
            .connections
            .get_mut(session_id)
            .ok_or_else(|| Error::UnknownSession(session_id.to_string()))?;
        conn.last_seen = now_millis();
        Ok(())
    }

    /// Drop a connection, handing it back so the caller can announce it.
    pub fn remove(&mut self, session_id: &str) -> Result<Connection> {
        self.connections
            .remove(session_id)
            .ok_or_else(|| Error::UnknownSession(session_id.to_string()))
    }

    pub fn get(&self, session_id: &str) -> Option<&Connection> {
        self.connections.get(session_id)
    }

    /// Snapshots of identified connections, in identification order.
    pub fn list_active(&self, roster: &Roster) -> Vec<ConnectionInfo> {
        let mut active: Vec<&Connection> = self
            .connections
            .values()
            .filter(|c| c.is_active())
            .collect();
        active.sort_by_key(|c| c.identified_seq);

        active
            .into_iter()
            .filter_map(|c| {
                let identity = c.identity.as_deref()?;
                let team_member = roster.resolve(identity).ok()?.clone();
                Some(ConnectionInfo {
                    session_id: c.session_id.clone(),
                    identity: identity.to_string(),
                    team_member,
                    connected_at: c.connected_at,
                    last_seen: c.last_seen,
                })
            })
            .collect()
    }

    /// Outbound handles of every open connection except `exclude`.
    ///
    /// The result is a snapshot; later registrations and removals do not
    /// affect a broadcast already iterating it.
    pub fn recipients(&self, exclude: Option<&str>) -> Vec<(String, Outbound)> {
        self.connections
            .values()
            .filter(|c| Some(c.session_id.as_str()) != exclude)
            .filter(|c| c.outbound.is_open())
            .map(|c| (c.session_id.clone(), c.outbound.clone()))
            .collect()
    }

    /// Number of registered connections, identified or not.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Number of identified connections.
    pub fn active_count(&self) -> usize {
        self.connections.values().filter(|c| c.is_active()).count()
    }
}
