//! The identity roster.
//!
//! A fixed set of participants known at process start. Connections and
//! events refer to identities by key; display metadata is looked up here
//! rather than copied into mutable connection state.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};

/// Display metadata for one roster member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Roster key, e.g. `heather`. Filled from the map key when loading.
    #[serde(default)]
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub emoji: String,
    pub color: String,
    pub role: String,
}

impl Identity {
    fn new(key: &str, name: &str, emoji: &str, color: &str, role: &str) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            emoji: emoji.to_string(),
            color: color.to_string(),
            role: role.to_string(),
        }
    }
}

/// Read-only lookup from identity key to [`Identity`].
///
/// Never written after construction, so a shared reference is safe to use
/// from any task.
#[derive(Debug, Clone)]
pub struct Roster {
    members: HashMap<String, Identity>,
}

impl Roster {
    /// Build a roster from a list of identities. Later duplicates win.
    pub fn new(members: impl IntoIterator<Item = Identity>) -> Self {
        let members = members
            .into_iter()
            .map(|identity| (identity.key.clone(), identity))
            .collect();
        Self { members }
    }

    /// The built-in three-member crew.
    pub fn crew() -> Self {
        Self::new([
            Identity::new("heather", "Heather", "🦎✨", "#8B5CF6", "Visionary Leader"),
            Identity::new("emmy", "Emmy", "🐕🐙", "#F59E0B", "Creative Strategist"),
            Identity::new("G", "G", "🐢", "#10B981", "Systems Architect"),
        ])
    }

    /// Parse a JSON object of the form `{"key": {"name", "emoji", "color", "role"}}`.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let raw: BTreeMap<String, Identity> = serde_json::from_str(json)?;
        Ok(Self::new(raw.into_iter().map(|(key, mut identity)| {
            identity.key = key;
            identity
        })))
    }

    /// Look up an identity by key.
    pub fn resolve(&self, key: &str) -> Result<&Identity> {
        self.members
            .get(key)
            .ok_or_else(|| Error::UnknownIdentity(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.members.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Default for Roster {
    fn default() -> Self {
        Self::crew()
    }
}
