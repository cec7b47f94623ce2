// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! NIPs

pub mod nip04;
pub mod nip05;
pub mod nip10;
pub mod nip11;
pub mod nip13;
pub mod nip19;
pub mod nip21;
pub mod nip42;
pub mod nip44;
pub mod nip46;
pub mod nip65;
