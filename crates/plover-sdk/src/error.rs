// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Client error

use thiserror::Error;

/// Client error
#[derive(Debug, Error)]
pub enum Error {
    /// Pool error
    #[error(transparent)]
    Pool(#[from] plover_pool::pool::Error),
    /// Relay error
    #[error(transparent)]
    Relay(#[from] plover_pool::relay::Error),
    /// Cache error
    #[error(transparent)]
    Cache(#[from] plover_cache::CacheError),
    /// Signer error
    #[error(transparent)]
    Signer(#[from] plover::SignerError),
    /// Event builder error
    #[error(transparent)]
    Builder(#[from] plover::event::builder::Error),
    /// Url error
    #[error(transparent)]
    Url(#[from] plover::types::url::Error),
    /// NIP05 error
    #[error(transparent)]
    NIP05(#[from] plover::nips::nip05::Error),
    /// No signer configured
    #[error("signer not configured")]
    SignerNotConfigured,
    /// Operation timed out
    #[error("timeout")]
    Timeout,
}
