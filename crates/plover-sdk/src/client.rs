// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Client

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use plover::nips::nip05;
use plover::{
    Event, EventBuilder, Filter, IntoSigner, JsonUtil, Kind, Metadata, PublicKey, RelayUrl,
    Signer, Timestamp, UnsignedEvent,
};
use plover_cache::{Cache, Nip05Entry, Profile};
use plover_outbox::{
    OutboxTracker, RelayMetrics, RelayRanker, RelaySelector, RelayListSource, Selection,
};
use plover_pool::pool::PoolNotification;
use plover_pool::{
    CacheUsage, PublishOptions, PublishOutput, RelayPool, SubscriptionHandle,
    SubscriptionOptions, SubscriptionUpdate,
};
use tokio::sync::RwLock;

use crate::error::Error;
use crate::options::ClientOptions;

/// Client builder
#[derive(Debug, Default)]
pub struct ClientBuilder {
    cache: Option<Arc<dyn Cache>>,
    signer: Option<Arc<dyn Signer>>,
    opts: ClientOptions,
}

impl ClientBuilder {
    /// New empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache
    pub fn cache<C>(mut self, cache: C) -> Self
    where
        C: Cache + 'static,
    {
        self.cache = Some(Arc::new(cache));
        self
    }

    /// Set the signer
    pub fn signer<S>(mut self, signer: S) -> Self
    where
        S: IntoSigner,
    {
        self.signer = Some(signer.into_signer());
        self
    }

    /// Set the options
    pub fn opts(mut self, opts: ClientOptions) -> Self {
        self.opts = opts;
        self
    }

    /// Build the client
    pub fn build(self) -> Client {
        Client::from_builder(self)
    }
}

/// High level Nostr client: owns the relay pool, the cache, the signer and
/// the outbox tracker.
#[derive(Debug, Clone)]
pub struct Client {
    pool: RelayPool,
    cache: Option<Arc<dyn Cache>>,
    signer: Arc<RwLock<Option<Arc<dyn Signer>>>>,
    selector: Arc<RelaySelector>,
    opts: ClientOptions,
}

impl Default for Client {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Client {
    /// New client builder
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// New client with a signer and default options
    pub fn new<S>(signer: S) -> Self
    where
        S: IntoSigner,
    {
        Self::builder().signer(signer).build()
    }

    fn from_builder(builder: ClientBuilder) -> Self {
        let pool: RelayPool = match &builder.cache {
            Some(cache) => RelayPool::with_cache(builder.opts.pool.clone(), cache.clone()),
            None => RelayPool::new(builder.opts.pool.clone()),
        };

        let tracker: Arc<OutboxTracker> = Arc::new(OutboxTracker::default());
        let selector: Arc<RelaySelector> = Arc::new(RelaySelector::new(
            tracker,
            RelayRanker::default(),
            builder.opts.selector,
        ));

        let client = Self {
            pool,
            cache: builder.cache,
            signer: Arc::new(RwLock::new(builder.signer.clone())),
            selector,
            opts: builder.opts,
        };

        if let Some(signer) = builder.signer {
            let pool = client.pool.clone();
            tokio::spawn(async move {
                pool.set_auth_signer(Some(signer)).await;
            });
        }

        client.spawn_ingester();
        client
    }

    /// Ingest relay lists and profiles from everything the pool receives
    fn spawn_ingester(&self) {
        let mut notifications = self.pool.notifications();
        let selector = self.selector.clone();
        let cache = self.cache.clone();
        tokio::spawn(async move {
            loop {
                let notification = match notifications.recv().await {
                    Ok(notification) => notification,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(..)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };

                let event: Box<Event> = match notification {
                    PoolNotification::Event { event, .. } => event,
                    PoolNotification::Shutdown => break,
                    _ => continue,
                };

                if event.kind == Kind::RELAY_LIST {
                    selector.tracker().process_event(&event).await;
                } else if event.kind == Kind::METADATA {
                    if let (Some(cache), Ok(metadata)) =
                        (&cache, Metadata::from_json(&event.content))
                    {
                        let _ = cache.set_profile(event.pubkey, metadata).await;
                    }
                }
            }
        });
    }

    /// Get the relay pool
    #[inline]
    pub fn pool(&self) -> &RelayPool {
        &self.pool
    }

    /// Get the cache, if any
    #[inline]
    pub fn cache(&self) -> Option<&Arc<dyn Cache>> {
        self.cache.as_ref()
    }

    /// Get the outbox selector
    #[inline]
    pub fn selector(&self) -> &Arc<RelaySelector> {
        &self.selector
    }

    /// Get the configured signer
    pub async fn signer(&self) -> Result<Arc<dyn Signer>, Error> {
        let signer = self.signer.read().await;
        signer.clone().ok_or(Error::SignerNotConfigured)
    }

    /// Replace the signer
    pub async fn set_signer<S>(&self, signer: Option<S>)
    where
        S: IntoSigner,
    {
        let signer = signer.map(|s| s.into_signer());
        {
            let mut slot = self.signer.write().await;
            slot.clone_from(&signer);
        }
        self.pool.set_auth_signer(signer).await;
    }

    /// Add a relay (does not connect)
    pub async fn add_relay<S>(&self, url: S) -> Result<(), Error>
    where
        S: AsRef<str>,
    {
        let url: RelayUrl = RelayUrl::parse(url)?;
        match self.pool.add_relay(url, self.opts.relay.clone()).await {
            Ok(..) => Ok(()),
            Err(plover_pool::pool::Error::RelayAlreadyAdded) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Connect every relay
    pub async fn connect(&self) {
        self.pool.connect().await
    }

    /// Disconnect every relay
    pub async fn disconnect(&self) {
        self.pool.disconnect().await
    }

    /// Shut the client down
    pub async fn shutdown(&self) {
        self.pool.shutdown().await
    }

    /// Current relay metrics, fed to the outbox ranker
    async fn relay_metrics(&self) -> HashMap<RelayUrl, RelayMetrics> {
        let mut metrics: HashMap<RelayUrl, RelayMetrics> = HashMap::new();
        for (url, relay) in self.pool.relays().await.into_iter() {
            let stats = relay.stats();
            metrics.insert(
                url,
                RelayMetrics {
                    success_rate: stats.success_rate(),
                    latency: stats.latency(),
                    matching_users: 0,
                },
            );
        }
        metrics
    }

    /// Make sure every relay in the selection is in the pool and connected
    async fn materialize_selection(&self, selection: &Selection) -> Result<(), Error> {
        for url in selection.relays.iter() {
            match self
                .pool
                .add_relay(url.clone(), self.opts.relay.clone())
                .await
            {
                Ok(relay) => relay.connect(),
                Err(plover_pool::pool::Error::RelayAlreadyAdded) => {
                    self.pool.connect_relay(url).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Fetch the relay lists (kind 10002) of the given pubkeys and feed the
    /// tracker
    pub async fn refresh_relay_lists(&self, public_keys: &[PublicKey]) -> Result<(), Error> {
        if public_keys.is_empty() {
            return Ok(());
        }

        let filter: Filter = Filter::new()
            .authors(public_keys.iter().copied())
            .kind(Kind::RELAY_LIST);
        let events: Vec<Event> = Box::pin(self.fetch_events(vec![filter], None)).await?;
        for event in events.iter() {
            self.selector.tracker().process_event(event).await;
        }
        Ok(())
    }

    /// Register a logical subscription.
    ///
    /// With the outbox model enabled and no explicit relay set, authors in
    /// the filters are resolved to their write relays.
    pub async fn subscribe(
        &self,
        filters: Vec<Filter>,
        mut opts: SubscriptionOptions,
    ) -> Result<SubscriptionHandle, Error> {
        if self.opts.outbox
            && opts.relay_set.is_none()
            && opts.cache_usage != CacheUsage::CacheOnly
        {
            let authors: Vec<PublicKey> = filters
                .iter()
                .filter_map(|filter| filter.authors.as_ref())
                .flatten()
                .copied()
                .collect();

            if !authors.is_empty() {
                let metrics = self.relay_metrics().await;
                let mut selection: Selection =
                    self.selector.select_for_fetch(&authors, &metrics).await;

                // Discover missing relay lists once, then retry the selection
                if !selection.missing.is_empty() {
                    let missing: Vec<PublicKey> = std::mem::take(&mut selection.missing);
                    if let Err(e) = self.refresh_relay_lists(&missing).await {
                        tracing::debug!("Relay list refresh failed: {e}");
                    }
                    selection = self.selector.select_for_fetch(&authors, &metrics).await;
                }

                if !selection.relays.is_empty() {
                    self.materialize_selection(&selection).await?;
                    opts.relay_set = Some(selection.relays.into_iter().collect());
                }
            }
        }

        Ok(self.pool.subscribe(filters, opts).await?)
    }

    /// One-shot query: subscribe, collect until EOSE (or the timeout), close.
    pub async fn fetch_events(
        &self,
        filters: Vec<Filter>,
        timeout: Option<Duration>,
    ) -> Result<Vec<Event>, Error> {
        let timeout: Duration = timeout.unwrap_or(self.opts.fetch_timeout);

        let mut handle: SubscriptionHandle = self
            .subscribe(
                filters,
                SubscriptionOptions::default().close_on_eose(true),
            )
            .await?;

        let mut events: Vec<Event> = Vec::new();
        let collect = async {
            while let Some(update) = handle.recv().await {
                match update {
                    SubscriptionUpdate::Event { event, .. } => events.push(*event),
                    SubscriptionUpdate::Eose | SubscriptionUpdate::Closed => break,
                    SubscriptionUpdate::Error(e) => {
                        tracing::debug!("Fetch error: {e}");
                        break;
                    }
                }
            }
        };

        if async_utility::time::timeout(Some(timeout), collect)
            .await
            .is_none()
        {
            handle.close().await;
        }

        Ok(events)
    }

    /// Sign and publish an event built with `builder`.
    ///
    /// Generates content tags, signs with the configured signer, validates
    /// and fans out. With the outbox model enabled the target set is the
    /// author's write relays plus every `p`-tagged recipient's read relays.
    pub async fn send_event_builder(&self, builder: EventBuilder) -> Result<PublishOutput, Error> {
        let signer: Arc<dyn Signer> = self.signer().await?;
        let public_key: PublicKey = signer.get_public_key().await?;

        let mut unsigned: UnsignedEvent = builder.build(public_key);
        unsigned.generate_content_tags();
        let event: Event = signer.sign_event(unsigned).await?;

        self.send_event(event).await
    }

    /// Publish an already signed event
    pub async fn send_event(&self, event: Event) -> Result<PublishOutput, Error> {
        let mut opts: PublishOptions = self.opts.publish.clone();

        if self.opts.outbox && opts.relay_set.is_none() {
            let recipients: Vec<PublicKey> = event.public_keys().collect();
            let metrics = self.relay_metrics().await;
            let selection: Selection = self
                .selector
                .select_for_publish(&event.pubkey, &recipients, &metrics)
                .await;

            if !selection.relays.is_empty() {
                self.materialize_selection(&selection).await?;
                opts.relay_set = Some(selection.relays.into_iter().collect());
            }
        }

        Ok(self.pool.publish(event, opts).await?)
    }

    /// Publish a text note
    pub async fn publish_text_note<S>(&self, content: S) -> Result<PublishOutput, Error>
    where
        S: Into<String>,
    {
        self.send_event_builder(EventBuilder::text_note(content)).await
    }

    /// Publish the user's metadata (kind 0)
    pub async fn set_metadata(&self, metadata: &Metadata) -> Result<PublishOutput, Error> {
        self.send_event_builder(EventBuilder::metadata(metadata)).await
    }

    /// Get a user's profile metadata: fresh cache entry, else relays
    pub async fn metadata(&self, public_key: PublicKey) -> Result<Option<Metadata>, Error> {
        if let Some(cache) = &self.cache {
            if let Some(profile) = cache.profile(&public_key).await? {
                if !profile.is_stale(plover_cache::DEFAULT_PROFILE_TTL) {
                    return Ok(Some(profile.metadata));
                }
            }
        }

        let filter: Filter = Filter::new()
            .author(public_key)
            .kind(Kind::METADATA)
            .limit(1);
        let events: Vec<Event> = self.fetch_events(vec![filter], None).await?;

        let newest: Option<&Event> = events.iter().max_by_key(|event| event.created_at);
        match newest {
            Some(event) => {
                let metadata: Metadata =
                    Metadata::from_json(&event.content).unwrap_or_default();
                if let Some(cache) = &self.cache {
                    cache.set_profile(public_key, metadata.clone()).await?;
                }
                Ok(Some(metadata))
            }
            None => Ok(None),
        }
    }

    /// Resolve a NIP05 identifier, consulting the cache first.
    ///
    /// NIP46 relay hints found in the response are fed to the outbox tracker.
    pub async fn resolve_nip05<S>(&self, identifier: S) -> Result<PublicKey, Error>
    where
        S: AsRef<str>,
    {
        let identifier: &str = identifier.as_ref();

        if let Some(cache) = &self.cache {
            if let Some(entry) = cache.nip05(identifier).await? {
                return Ok(entry.pubkey);
            }
        }

        let profile: nip05::Nip05Profile = nip05::get_profile(identifier).await?;

        if let Some(cache) = &self.cache {
            cache
                .set_nip05(
                    identifier,
                    Nip05Entry {
                        pubkey: profile.public_key,
                        relays: profile.relays.clone(),
                    },
                )
                .await?;
        }

        if !profile.relays.is_empty() {
            self.selector
                .tracker()
                .track(
                    profile.public_key,
                    profile.relays,
                    RelayListSource::Nip05Hint,
                )
                .await;
        }

        Ok(profile.public_key)
    }

    /// Get a cached profile entry with its freshness information
    pub async fn cached_profile(&self, public_key: &PublicKey) -> Result<Option<Profile>, Error> {
        match &self.cache {
            Some(cache) => Ok(cache.profile(public_key).await?),
            None => Ok(None),
        }
    }

    /// Retry events still awaiting publish confirmation
    pub async fn retry_unpublished(&self) -> Result<(), Error> {
        Ok(self.pool.retry_unpublished().await?)
    }

    /// Subscribe to pool notifications
    pub fn notifications(&self) -> tokio::sync::broadcast::Receiver<PoolNotification> {
        self.pool.notifications()
    }

    /// Publish the user's NIP65 relay list and track it locally
    pub async fn publish_relay_list<I>(&self, relays: I) -> Result<PublishOutput, Error>
    where
        I: IntoIterator<Item = (RelayUrl, Option<plover::nips::nip65::RelayMetadata>)>,
    {
        let relays: Vec<(RelayUrl, Option<plover::nips::nip65::RelayMetadata>)> =
            relays.into_iter().collect();
        let output = self
            .send_event_builder(EventBuilder::relay_list(relays))
            .await?;

        // Track our own list immediately
        if let Some(cache) = &self.cache {
            if let Some(event) = cache.event_by_id(&output.event_id).await? {
                self.selector.tracker().process_event(&event).await;
            }
        }

        Ok(output)
    }

    /// Current timestamp helper
    pub fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

#[cfg(test)]
mod tests {
    use plover::Keys;
    use plover_cache::MemoryCache;

    use super::*;

    #[tokio::test]
    async fn test_builder() {
        let keys = Keys::generate();
        let client = Client::builder()
            .signer(keys.clone())
            .cache(MemoryCache::new())
            .build();

        let signer = client.signer().await.unwrap();
        assert_eq!(signer.get_public_key().await.unwrap(), keys.public_key());
        assert!(client.cache().is_some());
    }

    #[tokio::test]
    async fn test_no_signer() {
        let client = Client::builder().build();
        assert!(matches!(
            client.signer().await,
            Err(Error::SignerNotConfigured)
        ));
        assert!(matches!(
            client.publish_text_note("hi").await,
            Err(Error::SignerNotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_add_relay_idempotent() {
        let client = Client::builder().build();
        client.add_relay("wss://relay.damus.io").await.unwrap();
        client.add_relay("wss://relay.damus.io").await.unwrap();
        assert_eq!(client.pool().relays().await.len(), 1);
    }
}
