// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Messages

use core::fmt;

use secp256k1::rand::distributions::Alphanumeric;
use secp256k1::rand::{self, Rng};
use serde::{Deserialize, Serialize};

pub mod client;
pub mod relay;

pub use self::client::ClientMessage;
pub use self::relay::{MachineReadablePrefix, RelayMessage};
use crate::event;

/// Messages error
#[derive(Debug, PartialEq, Eq)]
pub enum MessageError {
    /// Empty message
    EmptyMessage,
    /// Invalid message format
    InvalidFormat,
    /// Unknown message type
    UnknownType(String),
    /// Json error
    Json(String),
    /// Event error
    Event(event::Error),
    /// Event id error
    EventId(event::id::Error),
}

impl std::error::Error for MessageError {}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "Empty message"),
            Self::InvalidFormat => write!(f, "Invalid message format"),
            Self::UnknownType(t) => write!(f, "Unknown message type: {t}"),
            Self::Json(e) => write!(f, "Json: {e}"),
            Self::Event(e) => write!(f, "Event: {e}"),
            Self::EventId(e) => write!(f, "Event id: {e}"),
        }
    }
}

impl From<serde_json::Error> for MessageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

impl From<event::Error> for MessageError {
    fn from(e: event::Error) -> Self {
        Self::Event(e)
    }
}

impl From<event::id::Error> for MessageError {
    fn from(e: event::id::Error) -> Self {
        Self::EventId(e)
    }
}

/// Subscription ID: a short, relay-scoped opaque string
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Construct from a string
    pub fn new<S>(id: S) -> Self
    where
        S: Into<String>,
    {
        Self(id.into())
    }

    /// Generate a random 32-char alphanumeric subscription id
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self::generate_with_rng(&mut rng)
    }

    /// Generate a random subscription id with a custom RNG
    pub fn generate_with_rng<R>(rng: &mut R) -> Self
    where
        R: Rng,
    {
        let id: String = (0..32).map(|_| rng.sample(Alphanumeric) as char).collect();
        Self(id)
    }

    /// Get as `&str`
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Truncate to `max_len` chars, keeping the prefix
    pub fn truncated(&self, max_len: usize) -> Self {
        Self(self.0.chars().take(max_len).collect())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_len() {
        let id = SubscriptionId::generate();
        assert_eq!(id.as_str().len(), 32);
    }

    #[test]
    fn test_truncated() {
        let id = SubscriptionId::new("abcdefgh");
        assert_eq!(id.truncated(4), SubscriptionId::new("abcd"));
        assert_eq!(id.truncated(100), id);
    }
}
