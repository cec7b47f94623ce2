// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! High level Nostr client library.
//!
//! The [`Client`] owns the relay pool, the cache, the signer and the outbox
//! tracker, and is the external entry point of the stack.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

mod client;
mod error;
mod options;
pub mod prelude;

pub use self::client::{Client, ClientBuilder};
pub use self::error::Error;
pub use self::options::ClientOptions;
