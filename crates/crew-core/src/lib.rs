//! # crew-core
//!
//! Core types for the crew relay:
//! - The static identity roster
//! - Outbound events and the bounded history buffer
//! - Inbound envelope decoding
//! - Text extraction for externally injected messages
//!
//! This crate has no network code and no storage code.
//! The relay crate drives these types from its connection handlers.

pub mod envelope;
pub mod error;
pub mod event;
pub mod extract;
pub mod history;
pub mod roster;

pub use error::{Error, Result};

/// Current unix time in milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
