// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay Pool

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use atomic_destructor::{AtomicDestructor, AtomicDestroyer};
use plover::{
    ClientMessage, Event, EventBuilder, Filter, MachineReadablePrefix, RelayMessage, RelayUrl,
    Signer, SubscriptionId, UnsignedEvent,
};
use plover_cache::Cache;
use tokio::sync::{broadcast, mpsc, RwLock};

mod error;
mod options;
mod output;

pub use self::error::Error;
pub use self::options::{PoolOptions, PublishOptions};
use self::output::RelayPublishResult;
pub use self::output::PublishOutput;
use crate::manager::{
    RelayLink, SubscriptionHandle, SubscriptionManager, SubscriptionOptions,
};
use crate::relay::{Relay, RelayOptions};

const RELAY_LINK_CHANNEL_SIZE: usize = 1024;

/// Relay pool notification
#[derive(Debug, Clone)]
pub enum PoolNotification {
    /// Received an [`Event`] that passed the per-relay checks
    Event {
        /// Source relay
        relay_url: RelayUrl,
        /// Wire subscription id
        subscription_id: SubscriptionId,
        /// Event
        event: Box<Event>,
    },
    /// Received any [`RelayMessage`]
    Message {
        /// Source relay
        relay_url: RelayUrl,
        /// Message
        message: RelayMessage,
    },
    /// Pool is shutting down
    Shutdown,
}

type Relays = HashMap<RelayUrl, Relay>;

#[derive(Debug, Clone)]
struct InnerRelayPool {
    relays: Arc<RwLock<Relays>>,
    manager: SubscriptionManager,
    cache: Option<Arc<dyn Cache>>,
    /// Signer used for NIP42 authentication, when configured
    auth_signer: Arc<RwLock<Option<Arc<dyn Signer>>>>,
    notifications: broadcast::Sender<PoolNotification>,
    /// Cloned into every relay: parsed messages flow into the router task
    router_tx: mpsc::Sender<(RelayUrl, RelayMessage)>,
}

impl AtomicDestroyer for InnerRelayPool {
    fn on_destroy(&self) {
        let pool = self.clone();
        // The last handle may be dropped outside a runtime
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                pool.shutdown().await;
            });
        }
    }
}

impl InnerRelayPool {
    fn new(opts: PoolOptions, cache: Option<Arc<dyn Cache>>) -> Self {
        let (notifications, ..) = broadcast::channel(opts.notification_channel_size);
        let (router_tx, router_rx) = mpsc::channel(opts.notification_channel_size);

        let manager: SubscriptionManager = SubscriptionManager::new(opts.manager, cache.clone());

        let pool = Self {
            relays: Arc::new(RwLock::new(HashMap::new())),
            manager,
            cache,
            auth_signer: Arc::new(RwLock::new(None)),
            notifications,
            router_tx,
        };

        pool.spawn_router(router_rx);
        pool
    }

    /// Route parsed relay messages: events and subscription bookkeeping to
    /// the manager, everything to the notification observers, AUTH to the
    /// credential flow.
    fn spawn_router(&self, mut rx: mpsc::Receiver<(RelayUrl, RelayMessage)>) {
        let pool = self.clone();
        tokio::spawn(async move {
            while let Some((relay_url, message)) = rx.recv().await {
                match &message {
                    RelayMessage::Event {
                        subscription_id,
                        event,
                    } => {
                        let _ = pool.notifications.send(PoolNotification::Event {
                            relay_url: relay_url.clone(),
                            subscription_id: subscription_id.clone(),
                            event: event.clone(),
                        });
                        pool.manager.process(relay_url.clone(), message.clone()).await;
                    }
                    RelayMessage::EndOfStoredEvents(..) | RelayMessage::Closed { .. } => {
                        pool.manager.process(relay_url.clone(), message.clone()).await;
                    }
                    RelayMessage::Auth { challenge } => {
                        pool.handle_auth_challenge(&relay_url, challenge.clone());
                    }
                    // OK correlation happens on the per-relay wait paths
                    _ => {}
                }

                let _ = pool.notifications.send(PoolNotification::Message {
                    relay_url,
                    message,
                });
            }

            tracing::debug!("Relay pool router terminated.");
        });
    }

    /// NIP42: authenticate as soon as the challenge arrives, when a signer is
    /// configured. Without one the challenge stays recorded on the relay and
    /// restricted operations surface `auth-required` rejections.
    fn handle_auth_challenge(&self, relay_url: &RelayUrl, challenge: String) {
        let pool = self.clone();
        let relay_url = relay_url.clone();
        tokio::spawn(async move {
            let signer = {
                let auth_signer = pool.auth_signer.read().await;
                match auth_signer.as_ref() {
                    Some(signer) => signer.clone(),
                    None => return,
                }
            };

            let relay: Relay = {
                let relays = pool.relays.read().await;
                match relays.get(&relay_url) {
                    Some(relay) => relay.clone(),
                    None => return,
                }
            };

            match EventBuilder::auth(challenge, relay_url.clone())
                .sign(&signer)
                .await
            {
                Ok(event) => {
                    if let Err(e) = relay.auth(event).await {
                        tracing::warn!("Authentication with '{relay_url}' failed: {e}");
                    }
                }
                Err(e) => tracing::warn!("Impossible to sign auth event: {e}"),
            }
        });
    }

    async fn add_relay(&self, url: RelayUrl, opts: RelayOptions) -> Result<Relay, Error> {
        let mut relays = self.relays.write().await;
        if relays.contains_key(&url) {
            return Err(Error::RelayAlreadyAdded);
        }

        let relay: Relay = Relay::new(url.clone(), opts, self.router_tx.clone());

        // Manager-facing link: REQ/CLOSE frames forwarded into the relay
        let (link_tx, mut link_rx) = mpsc::channel::<ClientMessage>(RELAY_LINK_CHANNEL_SIZE);
        let link_relay: Relay = relay.clone();
        tokio::spawn(async move {
            while let Some(msg) = link_rx.recv().await {
                match link_relay.send_msg(msg).await {
                    Ok(()) => {}
                    // REQs issued while offline replay on reconnect
                    Err(crate::relay::Error::NotConnected) => {}
                    Err(e) => {
                        tracing::warn!("Impossible to forward frame to '{}': {e}", link_relay.url())
                    }
                }
            }
        });

        self.manager
            .add_relay(RelayLink {
                url: url.clone(),
                sender: link_tx,
                limits: relay.opts().limits,
            })
            .await;

        relays.insert(url, relay.clone());
        Ok(relay)
    }

    async fn remove_relay(&self, url: &RelayUrl) -> Result<(), Error> {
        let mut relays = self.relays.write().await;
        let relay: Relay = relays.remove(url).ok_or(Error::RelayNotFound)?;
        drop(relays);

        self.manager.remove_relay(url.clone()).await;
        relay.disconnect()?;
        Ok(())
    }

    async fn relay(&self, url: &RelayUrl) -> Result<Relay, Error> {
        let relays = self.relays.read().await;
        relays.get(url).cloned().ok_or(Error::RelayNotFound)
    }

    async fn all_relays(&self) -> Relays {
        self.relays.read().await.clone()
    }

    async fn connect(&self) {
        let relays = self.relays.read().await;
        for relay in relays.values() {
            relay.connect();
        }
    }

    async fn disconnect(&self) {
        let relays = self.relays.read().await;
        for relay in relays.values() {
            if let Err(e) = relay.disconnect() {
                tracing::error!("Impossible to disconnect '{}': {e}", relay.url());
            }
        }
    }

    async fn shutdown(&self) {
        self.disconnect().await;
        let _ = self.notifications.send(PoolNotification::Shutdown);
        tracing::info!("Relay pool shutdown");
    }

    async fn publish(&self, event: Event, opts: PublishOptions) -> Result<PublishOutput, Error> {
        // Write to the cache first: unacknowledged events survive in the
        // unpublished queue until every relay confirmed
        let targets: Vec<Relay> = match &opts.relay_set {
            Some(urls) => {
                let relays = self.relays.read().await;
                urls.iter()
                    .filter_map(|url| relays.get(url).cloned())
                    .collect()
            }
            None => {
                let relays = self.relays.read().await;
                relays
                    .values()
                    .filter(|relay| relay.is_connected())
                    .cloned()
                    .collect()
            }
        };

        if targets.is_empty() {
            return Err(Error::NoRelays);
        }

        let target_urls: Vec<RelayUrl> = targets.iter().map(|r| r.url().clone()).collect();

        if let Some(cache) = &self.cache {
            cache.save_event(&event, &[], None).await?;
            cache.add_unpublished(&event, &target_urls).await?;
        }

        let (tx, rx) = mpsc::channel(targets.len().max(1));
        for relay in targets.into_iter() {
            let tx = tx.clone();
            let event = event.clone();
            let opts = opts.clone();
            let cache = self.cache.clone();
            let auth_signer = self.auth_signer.clone();
            tokio::spawn(async move {
                let url: RelayUrl = relay.url().clone();
                let result: RelayPublishResult =
                    publish_to_relay(&relay, event.clone(), &opts, auth_signer).await;

                if let (RelayPublishResult::Success, Some(cache)) = (&result, &cache) {
                    let _ = cache.mark_published(&event.id, &url).await;
                }

                let _ = tx.send((url, result)).await;
            });
        }
        drop(tx);

        Ok(output::collect_publish_results(
            event.id,
            target_urls.into_iter().collect(),
            rx,
            opts.min_success,
            opts.overall_deadline(),
        )
        .await)
    }

    /// Retry events still awaiting publish confirmation on connected relays
    async fn retry_unpublished(&self, opts: &PublishOptions) -> Result<(), Error> {
        let cache = match &self.cache {
            Some(cache) => cache.clone(),
            None => return Ok(()),
        };

        let relays: Relays = self.all_relays().await;
        for (url, relay) in relays.into_iter() {
            if !relay.is_connected() {
                continue;
            }
            for event in cache.unpublished_for(&url).await? {
                match relay.send_event_wait(event.clone(), opts.relay_timeout).await {
                    Ok((true, _)) => {
                        cache.mark_published(&event.id, &url).await?;
                    }
                    Ok((false, message)) => {
                        // Duplicates count as delivered
                        if MachineReadablePrefix::parse(&message)
                            == Some(MachineReadablePrefix::Duplicate)
                        {
                            cache.mark_published(&event.id, &url).await?;
                        } else {
                            tracing::debug!(
                                "Retry of event {} on '{url}' rejected: {message}",
                                event.id
                            );
                        }
                    }
                    Err(e) => {
                        tracing::debug!("Retry of event {} on '{url}' failed: {e}", event.id);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Publish to a single relay, applying the retry policy.
async fn publish_to_relay(
    relay: &Relay,
    event: Event,
    opts: &PublishOptions,
    auth_signer: Arc<RwLock<Option<Arc<dyn Signer>>>>,
) -> RelayPublishResult {
    // Explicitly targeted relays may still be connecting
    relay.wait_for_connection(opts.relay_timeout).await;

    let first = relay.send_event_wait(event.clone(), opts.relay_timeout).await;

    let message: String = match first {
        Ok((true, _)) => return RelayPublishResult::Success,
        Ok((false, message)) => message,
        Err(crate::relay::Error::Timeout) => return RelayPublishResult::TimedOut,
        Err(e) => return RelayPublishResult::Failed(e.to_string()),
    };

    match MachineReadablePrefix::parse(&message) {
        // An event the relay already has is a successful publish
        Some(MachineReadablePrefix::Duplicate) => RelayPublishResult::Success,
        Some(MachineReadablePrefix::RateLimited) => {
            match opts.rate_limited_retry {
                Some(delay) => {
                    async_utility::time::sleep(delay).await;
                    retry_once(relay, event, opts).await
                }
                None => RelayPublishResult::Failed(message),
            }
        }
        Some(MachineReadablePrefix::AuthRequired) => {
            let signer = {
                let auth_signer = auth_signer.read().await;
                auth_signer.clone()
            };
            match (signer, relay.challenge().await) {
                (Some(signer), Some(challenge)) => {
                    let auth = EventBuilder::auth(challenge, relay.url().clone())
                        .sign(&signer)
                        .await;
                    match auth {
                        Ok(auth) => match relay.auth(auth).await {
                            Ok(()) => retry_once(relay, event, opts).await,
                            Err(e) => RelayPublishResult::Failed(e.to_string()),
                        },
                        Err(e) => RelayPublishResult::Failed(e.to_string()),
                    }
                }
                _ => RelayPublishResult::Failed(message),
            }
        }
        Some(MachineReadablePrefix::Pow) => {
            let difficulty: Option<u8> = parse_pow_difficulty(&message);
            let signer = {
                let auth_signer = auth_signer.read().await;
                auth_signer.clone()
            };
            match (difficulty, signer) {
                (Some(difficulty), Some(signer))
                    if opts.max_pow_difficulty > 0 && difficulty <= opts.max_pow_difficulty =>
                {
                    match mine_and_resign(event, difficulty, &signer).await {
                        Some(mined) => retry_once(relay, mined, opts).await,
                        None => RelayPublishResult::Failed(message),
                    }
                }
                _ => RelayPublishResult::Failed(message),
            }
        }
        _ => RelayPublishResult::Failed(message),
    }
}

async fn retry_once(relay: &Relay, event: Event, opts: &PublishOptions) -> RelayPublishResult {
    match relay.send_event_wait(event, opts.relay_timeout).await {
        Ok((true, _)) => RelayPublishResult::Success,
        Ok((false, message)) => match MachineReadablePrefix::parse(&message) {
            Some(MachineReadablePrefix::Duplicate) => RelayPublishResult::Success,
            _ => RelayPublishResult::Failed(message),
        },
        Err(crate::relay::Error::Timeout) => RelayPublishResult::TimedOut,
        Err(e) => RelayPublishResult::Failed(e.to_string()),
    }
}

/// Mine the event to the requested difficulty and re-sign it.
///
/// Mining changes the id, so the configured signer must re-sign; without one
/// the `pow:` rejection stands.
async fn mine_and_resign(
    event: Event,
    difficulty: u8,
    signer: &Arc<dyn Signer>,
) -> Option<Event> {
    const MAX_MINE_ITERATIONS: u64 = 5_000_000;

    let mut unsigned: UnsignedEvent = UnsignedEvent::from(event);
    unsigned.id = None;

    let mined: UnsignedEvent = tokio::task::spawn_blocking(move || {
        if plover::nips::nip13::mine(&mut unsigned, difficulty, MAX_MINE_ITERATIONS) {
            Some(unsigned)
        } else {
            None
        }
    })
    .await
    .ok()??;

    match signer.sign_event(mined).await {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!("Impossible to re-sign mined event: {e}");
            None
        }
    }
}

/// Extract the required difficulty from a `pow:` rejection message.
///
/// Relays commonly answer `pow: difficulty 25>=24`; the last number is the
/// target.
fn parse_pow_difficulty(message: &str) -> Option<u8> {
    message
        .split(|c: char| !c.is_ascii_digit())
        .filter(|chunk| !chunk.is_empty())
        .last()
        .and_then(|chunk| chunk.parse().ok())
}

/// Relay Pool.
///
/// Spawns background tasks: must be constructed from within a tokio runtime.
#[derive(Debug, Clone)]
pub struct RelayPool {
    inner: AtomicDestructor<InnerRelayPool>,
}

impl Default for RelayPool {
    fn default() -> Self {
        Self::new(PoolOptions::default())
    }
}

impl RelayPool {
    /// New relay pool without a cache
    pub fn new(opts: PoolOptions) -> Self {
        Self {
            inner: AtomicDestructor::new(InnerRelayPool::new(opts, None)),
        }
    }

    /// New relay pool backed by a cache
    pub fn with_cache(opts: PoolOptions, cache: Arc<dyn Cache>) -> Self {
        Self {
            inner: AtomicDestructor::new(InnerRelayPool::new(opts, Some(cache))),
        }
    }

    /// Get the cache, if any
    #[inline]
    pub fn cache(&self) -> Option<&Arc<dyn Cache>> {
        self.inner.cache.as_ref()
    }

    /// Set the signer used for NIP42 authentication
    pub async fn set_auth_signer(&self, signer: Option<Arc<dyn Signer>>) {
        let mut auth_signer = self.inner.auth_signer.write().await;
        *auth_signer = signer;
    }

    /// Subscribe to pool notifications
    #[inline]
    pub fn notifications(&self) -> broadcast::Receiver<PoolNotification> {
        self.inner.notifications.subscribe()
    }

    /// Add a relay to the pool (does not connect)
    pub async fn add_relay(&self, url: RelayUrl, opts: RelayOptions) -> Result<Relay, Error> {
        self.inner.add_relay(url, opts).await
    }

    /// Remove a relay from the pool, disconnecting it
    pub async fn remove_relay(&self, url: &RelayUrl) -> Result<(), Error> {
        self.inner.remove_relay(url).await
    }

    /// Get a relay by url
    pub async fn relay(&self, url: &RelayUrl) -> Result<Relay, Error> {
        self.inner.relay(url).await
    }

    /// Get all relays
    pub async fn relays(&self) -> HashMap<RelayUrl, Relay> {
        self.inner.all_relays().await
    }

    /// Connect every relay in the pool
    pub async fn connect(&self) {
        self.inner.connect().await
    }

    /// Connect a single relay
    pub async fn connect_relay(&self, url: &RelayUrl) -> Result<(), Error> {
        let relay: Relay = self.inner.relay(url).await?;
        relay.connect();
        Ok(())
    }

    /// Disconnect every relay in the pool
    pub async fn disconnect(&self) {
        self.inner.disconnect().await
    }

    /// Shut the pool down
    pub async fn shutdown(&self) {
        self.inner.shutdown().await
    }

    /// Register a logical subscription
    pub async fn subscribe(
        &self,
        filters: Vec<Filter>,
        opts: SubscriptionOptions,
    ) -> Result<SubscriptionHandle, Error> {
        Ok(self.inner.manager.subscribe(filters, opts).await?)
    }

    /// Close a logical subscription by id
    pub async fn close_subscription(&self, id: SubscriptionId) {
        self.inner.manager.close(id).await
    }

    /// Publish an already signed event.
    ///
    /// Validates the event, fans out to the target relays and aggregates the
    /// per-relay `OK` outcomes.
    pub async fn publish(
        &self,
        event: Event,
        opts: PublishOptions,
    ) -> Result<PublishOutput, Error> {
        event.verify().map_err(Error::InvalidEvent)?;
        self.inner.publish(event, opts).await
    }

    /// Retry events still awaiting publish confirmation
    pub async fn retry_unpublished(&self) -> Result<(), Error> {
        self.inner.retry_unpublished(&PublishOptions::default()).await
    }

    /// Sign an [`UnsignedEvent`] with `signer` and publish it.
    ///
    /// Content tags are generated before signing.
    pub async fn sign_and_publish<T>(
        &self,
        mut unsigned: UnsignedEvent,
        signer: &T,
        opts: PublishOptions,
    ) -> Result<PublishOutput, Error>
    where
        T: Signer,
    {
        unsigned.generate_content_tags();
        let event: Event = signer
            .sign_event(unsigned)
            .await
            .map_err(Error::Signer)?;
        self.publish(event, opts).await
    }
}
