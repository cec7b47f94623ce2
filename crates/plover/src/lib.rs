// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Nostr protocol core: events, filters, keys, wire messages and NIPs.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub use secp256k1;
pub use serde_json;

pub mod event;
pub mod filter;
pub mod key;
pub mod message;
pub mod nips;
pub mod prelude;
pub mod signer;
pub mod types;
pub mod util;

pub use self::event::{Address, Event, EventBuilder, EventId, Kind, Tag, UnsignedEvent};
pub use self::filter::{Filter, SingleLetterTag};
pub use self::key::{Keys, PublicKey, SecretKey};
pub use self::message::{ClientMessage, MachineReadablePrefix, RelayMessage, SubscriptionId};
pub use self::signer::{IntoSigner, Signer, SignerBackend, SignerError};
pub use self::types::{Metadata, RelayUrl, Timestamp};
pub use self::util::JsonUtil;
