// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay

use std::cmp;
use std::collections::HashMap;
use std::time::Duration;

use atomic_destructor::AtomicDestructor;
use plover::nips::nip11::RelayInformationDocument;
use plover::{ClientMessage, Event, Filter, RelayMessage, RelayUrl, SubscriptionId};
use tokio::sync::{broadcast, mpsc};

mod backoff;
mod error;
mod inner;
pub mod limits;
pub mod options;
pub mod stats;
mod status;
pub mod verification;

pub use self::error::Error;
use self::inner::InnerRelay;
pub use self::limits::RelayLimits;
pub use self::options::RelayOptions;
pub use self::stats::RelayConnectionStats;
pub use self::status::RelayStatus;
pub use self::verification::{SamplerDecision, SamplerOptions, VerificationSampler};

/// Relay notification
#[derive(Debug, Clone)]
pub enum RelayNotification {
    /// Received a [`RelayMessage`] that passed the per-relay checks
    Message {
        /// Relay message
        message: RelayMessage,
    },
    /// Relay status changed
    StatusChanged {
        /// New status
        status: RelayStatus,
    },
    /// NIP42 authentication succeeded
    Authenticated,
    /// Relay is shutting down
    Shutdown,
}

/// Relay
#[derive(Debug, Clone)]
pub struct Relay {
    pub(crate) inner: AtomicDestructor<InnerRelay>,
}

impl PartialEq for Relay {
    fn eq(&self, other: &Self) -> bool {
        self.inner.url == other.inner.url
    }
}

impl Eq for Relay {}

impl PartialOrd for Relay {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Relay {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.inner.url.cmp(&other.inner.url)
    }
}

impl Relay {
    pub(crate) fn new(
        url: RelayUrl,
        opts: RelayOptions,
        to_pool: mpsc::Sender<(RelayUrl, RelayMessage)>,
    ) -> Self {
        Self {
            inner: AtomicDestructor::new(InnerRelay::new(url, opts, to_pool)),
        }
    }

    /// Get relay url
    #[inline]
    pub fn url(&self) -> &RelayUrl {
        &self.inner.url
    }

    /// Get relay status
    #[inline]
    pub fn status(&self) -> RelayStatus {
        self.inner.status()
    }

    /// Check if relay is connected
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Last connection error, if the relay is in [`RelayStatus::Failed`]
    #[inline]
    pub async fn last_error(&self) -> Option<String> {
        self.inner.last_error().await
    }

    /// Get the NIP11 information document fetched on connect
    #[inline]
    pub async fn document(&self) -> RelayInformationDocument {
        self.inner.document().await
    }

    /// Pending NIP42 challenge, if the relay issued one
    #[inline]
    pub async fn challenge(&self) -> Option<String> {
        self.inner.challenge().await
    }

    /// Get relay options
    #[inline]
    pub fn opts(&self) -> &RelayOptions {
        &self.inner.opts
    }

    /// Get connection stats
    #[inline]
    pub fn stats(&self) -> &RelayConnectionStats {
        &self.inner.stats
    }

    /// Get the signature verification sampler
    #[inline]
    pub fn sampler(&self) -> &VerificationSampler {
        &self.inner.sampler
    }

    /// Get relay-level subscriptions (wire id -> filters)
    #[inline]
    pub async fn subscriptions(&self) -> HashMap<SubscriptionId, Vec<Filter>> {
        self.inner.subscriptions().await
    }

    /// Subscribe to relay notifications
    #[inline]
    pub fn notifications(&self) -> broadcast::Receiver<RelayNotification> {
        self.inner.notifications.subscribe()
    }

    /// Connect and keep the connection alive
    #[inline]
    pub fn connect(&self) {
        self.inner.connect()
    }

    /// Disconnect and stop the connection loop
    #[inline]
    pub fn disconnect(&self) -> Result<(), Error> {
        self.inner.disconnect()
    }

    /// Wait until the relay is connected, up to `timeout`
    #[inline]
    pub async fn wait_for_connection(&self, timeout: Duration) {
        self.inner.wait_for_connection(timeout).await
    }

    /// Send a message to the relay
    #[inline]
    pub async fn send_msg(&self, msg: ClientMessage) -> Result<(), Error> {
        self.inner.send_msg(msg).await
    }

    /// Send an event and wait for the matching `OK`
    #[inline]
    pub async fn send_event_wait(
        &self,
        event: Event,
        timeout: Duration,
    ) -> Result<(bool, String), Error> {
        self.inner.send_event_wait(event, timeout).await
    }

    /// Authenticate with a NIP42 event (waits for the `OK`)
    #[inline]
    pub async fn auth(&self, event: Event) -> Result<(), Error> {
        self.inner.auth(event).await
    }
}
