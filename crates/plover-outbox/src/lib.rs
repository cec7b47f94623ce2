// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Outbox model: publish to the author's advertised write relays, read from
//! the audience's read relays.
//!
//! The [`OutboxTracker`] keeps the per-user relay lists (NIP65), the
//! [`RelayRanker`] scores relays by observed behaviour, and the
//! [`RelaySelector`] produces the capped relay sets for reads and writes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

mod ranker;
mod selector;
mod tracker;

pub use self::ranker::{RankerWeights, RelayMetrics, RelayRanker};
pub use self::selector::{
    RelaySelector, Selection, SelectorOptions, DEFAULT_MAX_RELAYS_PER_SELECTION,
    DEFAULT_READ_RELAYS_PER_USER, DEFAULT_WRITE_RELAYS_PER_AUTHOR,
};
pub use self::tracker::{
    OutboxEntry, OutboxTracker, RelayListSource, TrackerStatus, DEFAULT_TRACKER_TTL,
};
