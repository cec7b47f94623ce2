// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Remote bunker signer (NIP46).

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

mod client;
mod error;

pub use self::client::{AuthUrlHandler, BunkerClient, DEFAULT_TIMEOUT};
pub use self::error::Error;
pub use plover::nips::nip46::BunkerUri;
