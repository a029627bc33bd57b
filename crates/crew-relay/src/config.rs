//! Relay configuration, read from the environment at startup.

use std::net::SocketAddr;
use std::path::PathBuf;

use crew_core::history::DEFAULT_CAPACITY;
use crew_core::roster::Roster;
use thiserror::Error;
use tracing::info;

/// Default number of history entries replayed to a client.
pub const DEFAULT_REPLAY: usize = 20;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_BIND: &str = "0.0.0.0";
const DEFAULT_STATIC_DIR: &str = "public";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("failed to read roster {path}: {source}")]
    RosterRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse roster {path}: {source}")]
    RosterParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("roster {0} has no members")]
    EmptyRoster(PathBuf),
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind_addr: SocketAddr,
    /// History buffer capacity.
    pub history_capacity: usize,
    /// How many history entries go into snapshots and `message_history`.
    pub history_replay: usize,
    /// Directory served to browsers.
    pub static_dir: PathBuf,
    /// JSON roster file; the built-in crew is used when unset.
    pub roster_path: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            history_capacity: DEFAULT_CAPACITY,
            history_replay: DEFAULT_REPLAY,
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            roster_path: None,
        }
    }
}

impl RelayConfig {
    /// Read `PORT`, `BIND_ADDR`, `HISTORY_CAPACITY`, `HISTORY_REPLAY`,
    /// `STATIC_DIR` and `ROSTER_PATH`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port: u16 = parse_or(&lookup, "PORT", DEFAULT_PORT)?;
        let host = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind_addr = format!("{host}:{port}")
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                var: "BIND_ADDR",
                value: host,
            })?;

        Ok(Self {
            bind_addr,
            history_capacity: parse_or(&lookup, "HISTORY_CAPACITY", DEFAULT_CAPACITY)?,
            history_replay: parse_or(&lookup, "HISTORY_REPLAY", DEFAULT_REPLAY)?,
            static_dir: lookup("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR)),
            roster_path: lookup("ROSTER_PATH").map(PathBuf::from),
        })
    }

    /// Load the roster named by `roster_path`, or the built-in crew.
    pub fn load_roster(&self) -> Result<Roster, ConfigError> {
        let Some(path) = &self.roster_path else {
            return Ok(Roster::crew());
        };
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::RosterRead {
            path: path.clone(),
            source,
        })?;
        let roster = Roster::from_json(&json).map_err(|source| ConfigError::RosterParse {
            path: path.clone(),
            source,
        })?;
        if roster.is_empty() {
            return Err(ConfigError::EmptyRoster(path.clone()));
        }
        info!("Loaded {} roster members from {}", roster.len(), path.display());
        Ok(roster)
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value }),
    }
}
