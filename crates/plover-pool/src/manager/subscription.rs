// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Logical subscriptions

use std::time::Duration;

use plover::{Event, RelayUrl, SubscriptionId};
use tokio::sync::{mpsc, watch};

use super::Command;

/// Default per-subscription event buffer soft cap
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 10_000;

/// How a subscription uses the cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheUsage {
    /// Query the cache first; go to relays unless the cache already satisfies
    /// the filter limits
    #[default]
    CacheFirst,
    /// Only query the cache, never contact relays
    CacheOnly,
    /// Query cache and relays in parallel
    Parallel,
    /// Skip the cache entirely
    RelayOnly,
}

/// Subscription options
#[derive(Debug, Clone)]
pub struct SubscriptionOptions {
    /// Close the subscription once every targeted relay reported EOSE
    pub close_on_eose: bool,
    /// Cache usage
    pub cache_usage: CacheUsage,
    /// Explicit relay set. `None` targets every relay in the pool (or what
    /// the outbox selector picked upstream).
    pub relay_set: Option<Vec<RelayUrl>>,
    /// Allow coalescing with compatible subscriptions under one REQ
    pub group_with_peers: bool,
    /// Soft cap of the event delivery buffer
    pub event_buffer_size: usize,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            close_on_eose: false,
            cache_usage: CacheUsage::default(),
            relay_set: None,
            group_with_peers: true,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
        }
    }
}

impl SubscriptionOptions {
    /// New default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the subscription at EOSE
    pub fn close_on_eose(mut self, close: bool) -> Self {
        self.close_on_eose = close;
        self
    }

    /// Set cache usage
    pub fn cache_usage(mut self, cache_usage: CacheUsage) -> Self {
        self.cache_usage = cache_usage;
        self
    }

    /// Set an explicit relay set
    pub fn relay_set<I>(mut self, relays: I) -> Self
    where
        I: IntoIterator<Item = RelayUrl>,
    {
        self.relay_set = Some(relays.into_iter().collect());
        self
    }

    /// Enable/disable coalescing with peer subscriptions
    pub fn group_with_peers(mut self, group: bool) -> Self {
        self.group_with_peers = group;
        self
    }
}

/// Subscription lifecycle state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Registered, not yet flushed to any relay
    #[default]
    Pending,
    /// At least one REQ issued
    Active,
    /// Every targeted relay reported EOSE
    Eosed,
    /// Closed
    Closed {
        /// Whether EOSE completed before the close
        eosed: bool,
    },
}

impl SubscriptionState {
    /// Check if closed
    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }

    /// Check if EOSE has completed
    #[inline]
    pub fn is_eosed(&self) -> bool {
        matches!(self, Self::Eosed | Self::Closed { eosed: true })
    }
}

/// Update delivered to a subscription
#[derive(Debug, Clone)]
pub enum SubscriptionUpdate {
    /// Matching event
    Event {
        /// The event
        event: Box<Event>,
        /// Source relay (`None` when served from the cache)
        relay_url: Option<RelayUrl>,
    },
    /// Every targeted relay reported EOSE
    Eose,
    /// Subscription-wide error
    Error(SubscriptionError),
    /// Subscription closed
    Closed,
}

/// Subscription-wide error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    /// No relays available to serve the subscription
    #[error("no relays available")]
    NoRelaysAvailable,
    /// Cache failure
    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),
}

/// Error awaiting EOSE
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AwaitEoseError {
    /// Subscription was closed before EOSE completed
    #[error("cancelled")]
    Cancelled,
    /// The manager shut down
    #[error("shutdown")]
    Shutdown,
}

/// Handle of a logical subscription.
///
/// Dropping the handle (or its updates receiver) closes the subscription.
#[derive(Debug)]
pub struct SubscriptionHandle {
    pub(super) id: SubscriptionId,
    pub(super) updates: mpsc::Receiver<SubscriptionUpdate>,
    pub(super) state: watch::Receiver<SubscriptionState>,
    pub(super) to_manager: mpsc::Sender<Command>,
}

impl SubscriptionHandle {
    /// Subscription id
    #[inline]
    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    /// Current state
    #[inline]
    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    /// Receive the next update.
    ///
    /// Returns `None` once the subscription is closed and the buffer drained.
    pub async fn recv(&mut self) -> Option<SubscriptionUpdate> {
        self.updates.recv().await
    }

    /// Wait until every targeted relay reported EOSE.
    ///
    /// Completes with [`AwaitEoseError::Cancelled`] when the subscription is
    /// closed first, without consuming buffered events.
    pub async fn await_eose(&mut self) -> Result<(), AwaitEoseError> {
        loop {
            let state: SubscriptionState = *self.state.borrow_and_update();
            if state.is_eosed() {
                return Ok(());
            }
            if state.is_closed() {
                return Err(AwaitEoseError::Cancelled);
            }
            if self.state.changed().await.is_err() {
                return Err(AwaitEoseError::Shutdown);
            }
        }
    }

    /// Close the subscription.
    ///
    /// Cancels pending batched REQs and sends `CLOSE` to every relay with an
    /// open group membership. Closing an already-closed subscription is a
    /// no-op.
    pub async fn close(&self) {
        let _ = self
            .to_manager
            .send(Command::Close(self.id.clone()))
            .await;
    }
}

impl SubscriptionHandle {
    /// Wait for EOSE with a timeout
    pub async fn await_eose_timeout(&mut self, timeout: Duration) -> Result<(), AwaitEoseError> {
        match async_utility::time::timeout(Some(timeout), self.await_eose()).await {
            Some(res) => res,
            None => Err(AwaitEoseError::Cancelled),
        }
    }
}
