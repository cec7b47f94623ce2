// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Prelude

#![allow(unknown_lints)]
#![allow(ambiguous_glob_reexports)]
#![doc(hidden)]

pub use plover::prelude::*;
pub use plover_cache::*;
pub use plover_connect::*;
pub use plover_outbox::*;
pub use plover_pool::prelude::*;

pub use crate::*;
