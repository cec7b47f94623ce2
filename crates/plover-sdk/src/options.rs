// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Client options

use std::time::Duration;

use plover_outbox::SelectorOptions;
use plover_pool::{PoolOptions, PublishOptions, RelayOptions};

/// Client options
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Pool options
    pub pool: PoolOptions,
    /// Options applied to relays added through the client
    pub relay: RelayOptions,
    /// Default publish options
    pub publish: PublishOptions,
    /// Enable the outbox model: choose relays from the tracked per-user
    /// relay lists instead of blind fan-out
    pub outbox: bool,
    /// Outbox selector options
    pub selector: SelectorOptions,
    /// Default timeout of one-shot fetches
    pub fetch_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientOptions {
    /// New default options
    pub fn new() -> Self {
        Self {
            pool: PoolOptions::default(),
            relay: RelayOptions::default(),
            publish: PublishOptions::default(),
            outbox: false,
            selector: SelectorOptions::default(),
            fetch_timeout: Duration::from_secs(10),
        }
    }

    /// Enable/disable the outbox model
    pub fn outbox(mut self, enable: bool) -> Self {
        self.outbox = enable;
        self
    }
}
