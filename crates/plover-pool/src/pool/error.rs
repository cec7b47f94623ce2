// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay pool error

use thiserror::Error;

/// Relay pool error
#[derive(Debug, Error)]
pub enum Error {
    /// Relay error
    #[error(transparent)]
    Relay(#[from] crate::relay::Error),
    /// Subscription manager error
    #[error(transparent)]
    Manager(#[from] crate::manager::Error),
    /// Cache error
    #[error(transparent)]
    Cache(#[from] plover_cache::CacheError),
    /// Url error
    #[error(transparent)]
    Url(#[from] plover::types::url::Error),
    /// Relay not found in the pool
    #[error("relay not found")]
    RelayNotFound,
    /// Relay already present in the pool
    #[error("relay already added")]
    RelayAlreadyAdded,
    /// No relays available
    #[error("no relays available")]
    NoRelays,
    /// Event signing failed
    #[error("signer: {0}")]
    Signer(#[from] plover::SignerError),
    /// Invalid event
    #[error("invalid event: {0}")]
    InvalidEvent(plover::event::Error),
    /// Pool is shutting down
    #[error("shutdown")]
    Shutdown,
}
