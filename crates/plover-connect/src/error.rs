// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Bunker signer error

use plover::nips::{nip04, nip44, nip46};
use plover::PublicKey;
use thiserror::Error;

/// Bunker signer error
#[derive(Debug, Error)]
pub enum Error {
    /// NIP04 error
    #[error(transparent)]
    NIP04(#[from] nip04::Error),
    /// NIP44 error
    #[error(transparent)]
    NIP44(#[from] nip44::Error),
    /// NIP46 error
    #[error(transparent)]
    NIP46(#[from] nip46::Error),
    /// Event builder error
    #[error(transparent)]
    Builder(#[from] plover::event::builder::Error),
    /// Pool error
    #[error(transparent)]
    Pool(#[from] plover_pool::pool::Error),
    /// The bunker rejected the request
    #[error("bunker rejected the request: {0}")]
    BunkerRejected(String),
    /// No response within the timeout
    #[error("bunker timeout")]
    BunkerTimeout,
    /// The response payload did not match the request
    #[error("unexpected response: expected {expected}")]
    UnexpectedResponse {
        /// What the request expected
        expected: &'static str,
    },
    /// The user public key received from the bunker does not match
    #[error("user public key not match: expected {expected}, got {found}")]
    UserPublicKeyNotMatch {
        /// Expected
        expected: Box<PublicKey>,
        /// Found
        found: Box<PublicKey>,
    },
    /// Pool shut down while waiting
    #[error("shutdown")]
    Shutdown,
}
