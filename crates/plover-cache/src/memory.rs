// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Memory (RAM) cache

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use plover::{Event, EventId, Filter, Metadata, PublicKey, RelayUrl};
use tokio::sync::{Mutex, RwLock};

use crate::index::EventIndex;
use crate::{
    Backend, Cache, CacheError, Nip05Entry, Profile, SaveEventStatus, DEFAULT_PROFILE_TTL,
};

/// Memory cache options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryCacheOptions {
    /// Max events to keep in memory (`None` means unbounded)
    pub max_events: Option<usize>,
    /// Max profiles to keep in memory
    pub max_profiles: usize,
    /// Profile freshness window
    pub profile_ttl: Duration,
}

impl Default for MemoryCacheOptions {
    fn default() -> Self {
        Self {
            max_events: Some(100_000),
            max_profiles: 10_000,
            profile_ttl: DEFAULT_PROFILE_TTL,
        }
    }
}

#[derive(Debug, Default)]
struct UnpublishedQueue {
    /// event id -> relays still awaiting OK
    pending: HashMap<EventId, HashSet<RelayUrl>>,
    events: HashMap<EventId, Event>,
}

/// Memory cache.
///
/// Events behind a reader-writer lock, profiles in a bounded LRU.
pub struct MemoryCache {
    opts: MemoryCacheOptions,
    index: RwLock<EventIndex>,
    seen: Mutex<HashMap<EventId, HashSet<RelayUrl>>>,
    profiles: Mutex<LruCache<PublicKey, Profile>>,
    nip05: Mutex<HashMap<String, Nip05Entry>>,
    unpublished: Mutex<UnpublishedQueue>,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("opts", &self.opts)
            .finish_non_exhaustive()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    /// New memory cache with default options
    pub fn new() -> Self {
        Self::with_opts(MemoryCacheOptions::default())
    }

    /// New memory cache
    pub fn with_opts(opts: MemoryCacheOptions) -> Self {
        let max_profiles: NonZeroUsize =
            NonZeroUsize::new(opts.max_profiles).unwrap_or(NonZeroUsize::MIN);
        Self {
            opts,
            index: RwLock::new(EventIndex::new()),
            seen: Mutex::new(HashMap::new()),
            profiles: Mutex::new(LruCache::new(max_profiles)),
            nip05: Mutex::new(HashMap::new()),
            unpublished: Mutex::new(UnpublishedQueue::default()),
        }
    }

    /// Profile freshness window
    pub fn profile_ttl(&self) -> Duration {
        self.opts.profile_ttl
    }
}

#[async_trait]
impl Cache for MemoryCache {
    fn backend(&self) -> Backend {
        Backend::Memory
    }

    async fn save_event(
        &self,
        event: &Event,
        _filters: &[Filter],
        relay_url: Option<&RelayUrl>,
    ) -> Result<SaveEventStatus, CacheError> {
        if let Some(relay_url) = relay_url {
            let mut seen = self.seen.lock().await;
            seen.entry(event.id)
                .or_default()
                .insert(relay_url.clone());
        }

        let mut index = self.index.write().await;
        let status: SaveEventStatus = index.insert(event);
        if let Some(max) = self.opts.max_events {
            index.truncate(max);
        }
        Ok(status)
    }

    async fn query(&self, filters: &[Filter]) -> Result<Vec<Event>, CacheError> {
        let index = self.index.read().await;
        Ok(index.query(filters))
    }

    async fn event_by_id(&self, event_id: &EventId) -> Result<Option<Event>, CacheError> {
        let index = self.index.read().await;
        Ok(index.event_by_id(event_id).cloned())
    }

    async fn event_seen_on(&self, event_id: &EventId) -> Result<Vec<RelayUrl>, CacheError> {
        let seen = self.seen.lock().await;
        Ok(seen
            .get(event_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn profile(&self, public_key: &PublicKey) -> Result<Option<Profile>, CacheError> {
        let mut profiles = self.profiles.lock().await;
        Ok(profiles.get(public_key).cloned())
    }

    async fn set_profile(
        &self,
        public_key: PublicKey,
        metadata: Metadata,
    ) -> Result<(), CacheError> {
        let mut profiles = self.profiles.lock().await;
        profiles.put(public_key, Profile::new(metadata));
        Ok(())
    }

    async fn nip05(&self, identifier: &str) -> Result<Option<Nip05Entry>, CacheError> {
        let nip05 = self.nip05.lock().await;
        Ok(nip05.get(identifier).cloned())
    }

    async fn set_nip05(&self, identifier: &str, entry: Nip05Entry) -> Result<(), CacheError> {
        let mut nip05 = self.nip05.lock().await;
        nip05.insert(identifier.to_string(), entry);
        Ok(())
    }

    async fn add_unpublished(
        &self,
        event: &Event,
        relays: &[RelayUrl],
    ) -> Result<(), CacheError> {
        if relays.is_empty() {
            return Ok(());
        }

        let mut unpublished = self.unpublished.lock().await;
        unpublished
            .pending
            .entry(event.id)
            .or_default()
            .extend(relays.iter().cloned());
        unpublished.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn unpublished_for(&self, relay_url: &RelayUrl) -> Result<Vec<Event>, CacheError> {
        let unpublished = self.unpublished.lock().await;
        Ok(unpublished
            .pending
            .iter()
            .filter(|(_, relays)| relays.contains(relay_url))
            .filter_map(|(event_id, _)| unpublished.events.get(event_id))
            .cloned()
            .collect())
    }

    async fn mark_published(
        &self,
        event_id: &EventId,
        relay_url: &RelayUrl,
    ) -> Result<(), CacheError> {
        let mut unpublished = self.unpublished.lock().await;
        if let Some(relays) = unpublished.pending.get_mut(event_id) {
            relays.remove(relay_url);
            if relays.is_empty() {
                unpublished.pending.remove(event_id);
                unpublished.events.remove(event_id);
            }
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.index.write().await.clear();
        self.seen.lock().await.clear();
        self.profiles.lock().await.clear();
        self.nip05.lock().await.clear();
        let mut unpublished = self.unpublished.lock().await;
        unpublished.pending.clear();
        unpublished.events.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use plover::{EventBuilder, JsonUtil, Keys, Kind, Timestamp};

    use super::*;

    #[tokio::test]
    async fn test_replaceable_query_returns_newest() {
        let cache = MemoryCache::new();
        let keys = Keys::generate();

        let old = EventBuilder::metadata(&Metadata::new().name("old"))
            .custom_created_at(Timestamp::from(1000))
            .sign_with_keys(&keys)
            .unwrap();
        let new = EventBuilder::metadata(&Metadata::new().name("new"))
            .custom_created_at(Timestamp::from(2000))
            .sign_with_keys(&keys)
            .unwrap();

        cache.save_event(&old, &[], None).await.unwrap();
        cache.save_event(&new, &[], None).await.unwrap();

        let result = cache
            .query(&[Filter::new().author(keys.public_key()).kind(Kind::METADATA)])
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        let metadata = Metadata::from_json(&result[0].content).unwrap();
        assert_eq!(metadata.name.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_event_by_id_exact() {
        let cache = MemoryCache::new();
        let keys = Keys::generate();
        let event = EventBuilder::text_note("x").sign_with_keys(&keys).unwrap();

        cache.save_event(&event, &[], None).await.unwrap();
        let found = cache.event_by_id(&event.id).await.unwrap().unwrap();
        assert_eq!(found, event);
    }

    #[tokio::test]
    async fn test_seen_on_relays() {
        let cache = MemoryCache::new();
        let keys = Keys::generate();
        let event = EventBuilder::text_note("x").sign_with_keys(&keys).unwrap();
        let relay = RelayUrl::parse("wss://relay.damus.io").unwrap();

        cache.save_event(&event, &[], Some(&relay)).await.unwrap();
        cache.save_event(&event, &[], Some(&relay)).await.unwrap();

        assert_eq!(cache.event_seen_on(&event.id).await.unwrap(), vec![relay]);
    }

    #[tokio::test]
    async fn test_unpublished_queue() {
        let cache = MemoryCache::new();
        let keys = Keys::generate();
        let event = EventBuilder::text_note("retry me").sign_with_keys(&keys).unwrap();
        let r1 = RelayUrl::parse("wss://one.example.com").unwrap();
        let r2 = RelayUrl::parse("wss://two.example.com").unwrap();

        cache
            .add_unpublished(&event, &[r1.clone(), r2.clone()])
            .await
            .unwrap();
        assert_eq!(cache.unpublished_for(&r1).await.unwrap().len(), 1);

        cache.mark_published(&event.id, &r1).await.unwrap();
        assert!(cache.unpublished_for(&r1).await.unwrap().is_empty());
        assert_eq!(cache.unpublished_for(&r2).await.unwrap().len(), 1);

        cache.mark_published(&event.id, &r2).await.unwrap();
        assert!(cache.unpublished_for(&r2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_profile_roundtrip() {
        let cache = MemoryCache::new();
        let keys = Keys::generate();

        assert!(cache.profile(&keys.public_key()).await.unwrap().is_none());
        cache
            .set_profile(keys.public_key(), Metadata::new().name("alice"))
            .await
            .unwrap();
        let profile = cache.profile(&keys.public_key()).await.unwrap().unwrap();
        assert_eq!(profile.metadata.name.as_deref(), Some("alice"));
        assert!(!profile.is_stale(DEFAULT_PROFILE_TTL));
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = MemoryCache::new();
        let keys = Keys::generate();
        let event = EventBuilder::text_note("x").sign_with_keys(&keys).unwrap();
        cache.save_event(&event, &[], None).await.unwrap();

        cache.clear().await.unwrap();
        assert!(cache.event_by_id(&event.id).await.unwrap().is_none());
    }
}
