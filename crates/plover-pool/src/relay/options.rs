// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay options

use std::time::Duration;

use super::limits::RelayLimits;
use super::verification::SamplerOptions;

pub(super) const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);
pub(super) const DEFAULT_RETRY_BASE: Duration = Duration::from_secs(1);
pub(super) const DEFAULT_RETRY_CAP: Duration = Duration::from_secs(300);

/// Relay options
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Enable automatic reconnection (default: true)
    pub reconnect: bool,
    /// Base delay of the reconnection backoff (default: 1 s)
    pub retry_base: Duration,
    /// Cap of the reconnection backoff (default: 300 s)
    pub retry_cap: Duration,
    /// Per-attempt connection timeout (default: 10 s)
    pub connection_timeout: Duration,
    /// Outbound queue hard cap (default: 1024)
    pub outbound_queue_size: usize,
    /// Limits
    pub limits: RelayLimits,
    /// Signature verification sampler tunables
    pub sampler: SamplerOptions,
    /// Fetch the NIP11 information document on open (default: true)
    pub fetch_information_document: bool,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            reconnect: true,
            retry_base: DEFAULT_RETRY_BASE,
            retry_cap: DEFAULT_RETRY_CAP,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            outbound_queue_size: 1024,
            limits: RelayLimits::default(),
            sampler: SamplerOptions::default(),
            fetch_information_document: true,
        }
    }
}

impl RelayOptions {
    /// New default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable/disable automatic reconnection
    pub fn reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set connection timeout
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set limits
    pub fn limits(mut self, limits: RelayLimits) -> Self {
        self.limits = limits;
        self
    }
}
