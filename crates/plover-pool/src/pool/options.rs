// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Pool options

use std::time::Duration;

use plover::RelayUrl;

use crate::manager::ManagerOptions;

/// Relay pool options
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Notification channel size (default: 4096)
    pub notification_channel_size: usize,
    /// Subscription manager options
    pub manager: ManagerOptions,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            notification_channel_size: 4096,
            manager: ManagerOptions::default(),
        }
    }
}

/// Publish options
#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// Relays that must acknowledge the event for the publish to count as
    /// succeeded (default: 1)
    pub min_success: usize,
    /// Per-relay OK timeout (default: 10 s)
    pub relay_timeout: Duration,
    /// Overall deadline; `None` derives it from the per-relay timeout
    pub deadline: Option<Duration>,
    /// Retry once after a `rate-limited:` rejection, with this delay
    /// (`None` disables the retry)
    pub rate_limited_retry: Option<Duration>,
    /// Difficulty cap for a `pow:` rejection mining attempt (0 disables)
    pub max_pow_difficulty: u8,
    /// Explicit target relays. `None` fans out to every connected relay.
    pub relay_set: Option<Vec<RelayUrl>>,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            min_success: 1,
            relay_timeout: Duration::from_secs(10),
            deadline: None,
            rate_limited_retry: Some(Duration::from_secs(1)),
            max_pow_difficulty: 24,
            relay_set: None,
        }
    }
}

impl PublishOptions {
    /// New default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set minimum successes
    pub fn min_success(mut self, min_success: usize) -> Self {
        self.min_success = min_success.max(1);
        self
    }

    /// Set per-relay timeout
    pub fn relay_timeout(mut self, timeout: Duration) -> Self {
        self.relay_timeout = timeout;
        self
    }

    /// Set explicit target relays
    pub fn relay_set<I>(mut self, relays: I) -> Self
    where
        I: IntoIterator<Item = RelayUrl>,
    {
        self.relay_set = Some(relays.into_iter().collect());
        self
    }

    /// Overall deadline
    pub(crate) fn overall_deadline(&self) -> Duration {
        self.deadline
            .unwrap_or(self.relay_timeout + Duration::from_secs(2))
    }
}
