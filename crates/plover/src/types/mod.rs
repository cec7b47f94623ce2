// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Shared types

pub mod metadata;
pub mod time;
pub mod url;

pub use self::metadata::Metadata;
pub use self::time::Timestamp;
pub use self::url::RelayUrl;
