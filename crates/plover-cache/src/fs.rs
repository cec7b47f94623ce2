// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! File-backed cache

use std::collections::{HashMap, HashSet};
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lru::LruCache;
use plover::{Event, EventId, Filter, JsonUtil, Metadata, PublicKey, RelayUrl, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task;

use crate::index::EventIndex;
use crate::{Backend, Cache, CacheError, Nip05Entry, Profile, SaveEventStatus};

const CACHE_FORMAT_VERSION: u32 = 1;
const PROFILE_LRU_SIZE: usize = 1_000;

#[derive(Debug, Serialize, Deserialize)]
struct CacheMeta {
    version: u32,
    /// Last compaction run
    #[serde(default)]
    compacted_at: Option<Timestamp>,
}

struct Inner {
    index: EventIndex,
    seen: HashMap<EventId, HashSet<RelayUrl>>,
    profiles: LruCache<PublicKey, Profile>,
    nip05: HashMap<String, Nip05Entry>,
    /// relay url -> event ids awaiting publish
    unpublished: HashMap<RelayUrl, HashSet<EventId>>,
    /// Ephemeral bodies are kept off disk, session-only
    unpublished_ephemeral: HashMap<EventId, Event>,
}

/// File-backed cache.
///
/// One JSON file per event and profile, sharded by the first two hex chars.
/// Index structures are rebuilt by scanning the store on open; writes are
/// atomic via rename.
pub struct FileCache {
    root: PathBuf,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for FileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCache")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

fn shard_path(base: &Path, hex: &str) -> PathBuf {
    base.join(&hex[..2]).join(format!("{hex}.json"))
}

fn atomic_write(path: &Path, content: &str) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp: PathBuf = path.with_extension("json.tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn scan_events(dir: &Path) -> Result<EventIndex, CacheError> {
    let mut index: EventIndex = EventIndex::new();

    if !dir.exists() {
        return Ok(index);
    }

    for shard in fs::read_dir(dir)? {
        let shard = shard?.path();
        if !shard.is_dir() {
            continue;
        }
        for entry in fs::read_dir(&shard)? {
            let path: PathBuf = entry?.path();
            match fs::read_to_string(&path).map_err(CacheError::from).and_then(|json| {
                Event::from_json(json).map_err(|e| CacheError::Backend(e.to_string()))
            }) {
                Ok(event) => {
                    index.insert(&event);
                }
                Err(e) => {
                    tracing::warn!("Skipping corrupt cache entry {}: {e}", path.display());
                }
            }
        }
    }

    Ok(index)
}

fn load_json_map<T>(path: &Path) -> Result<T, CacheError>
where
    T: Default + for<'de> Deserialize<'de>,
{
    if !path.exists() {
        return Ok(T::default());
    }
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

impl FileCache {
    /// Open (or initialize) a file cache rooted at `root`.
    ///
    /// Scans the event store to rebuild the in-memory indices.
    pub async fn open<P>(root: P) -> Result<Self, CacheError>
    where
        P: AsRef<Path>,
    {
        let root: PathBuf = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("events"))?;
        fs::create_dir_all(root.join("profiles"))?;

        // Format version check
        let meta_path: PathBuf = root.join("meta.json");
        if meta_path.exists() {
            let meta: CacheMeta = serde_json::from_str(&fs::read_to_string(&meta_path)?)?;
            if meta.version != CACHE_FORMAT_VERSION {
                return Err(CacheError::UnsupportedVersion(meta.version));
            }
        } else {
            let meta = CacheMeta {
                version: CACHE_FORMAT_VERSION,
                compacted_at: None,
            };
            atomic_write(&meta_path, &serde_json::to_string(&meta)?)?;
        }

        // Rebuild indices off the async runtime
        let events_dir: PathBuf = root.join("events");
        let index: EventIndex = task::spawn_blocking(move || scan_events(&events_dir))
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))??;

        let nip05: HashMap<String, Nip05Entry> = load_json_map(&root.join("nip05.json"))?;
        let unpublished_raw: HashMap<String, Vec<EventId>> =
            load_json_map(&root.join("unpublished.json"))?;
        let unpublished: HashMap<RelayUrl, HashSet<EventId>> = unpublished_raw
            .into_iter()
            .filter_map(|(url, ids)| {
                Some((RelayUrl::parse(url).ok()?, ids.into_iter().collect()))
            })
            .collect();

        tracing::debug!(
            "File cache opened at {} with {} events",
            root.display(),
            index.len()
        );

        Ok(Self {
            root,
            inner: Mutex::new(Inner {
                index,
                seen: HashMap::new(),
                profiles: LruCache::new(
                    NonZeroUsize::new(PROFILE_LRU_SIZE).unwrap_or(NonZeroUsize::MIN),
                ),
                nip05,
                unpublished,
                unpublished_ephemeral: HashMap::new(),
            }),
        })
    }

    fn event_path(&self, event_id: &EventId) -> PathBuf {
        shard_path(&self.root.join("events"), &event_id.to_hex())
    }

    fn profile_path(&self, public_key: &PublicKey) -> PathBuf {
        shard_path(&self.root.join("profiles"), &public_key.to_hex())
    }

    fn persist_event(&self, event: &Event) -> Result<(), CacheError> {
        atomic_write(&self.event_path(&event.id), &event.as_json())
    }

    fn persist_nip05(&self, inner: &Inner) -> Result<(), CacheError> {
        atomic_write(
            &self.root.join("nip05.json"),
            &serde_json::to_string(&inner.nip05)?,
        )
    }

    fn persist_unpublished(&self, inner: &Inner) -> Result<(), CacheError> {
        let raw: HashMap<String, Vec<EventId>> = inner
            .unpublished
            .iter()
            .map(|(url, ids)| (url.to_string(), ids.iter().copied().collect()))
            .collect();
        atomic_write(
            &self.root.join("unpublished.json"),
            &serde_json::to_string(&raw)?,
        )
    }
}

#[async_trait]
impl Cache for FileCache {
    fn backend(&self) -> Backend {
        Backend::FileSystem
    }

    async fn save_event(
        &self,
        event: &Event,
        _filters: &[Filter],
        relay_url: Option<&RelayUrl>,
    ) -> Result<SaveEventStatus, CacheError> {
        let mut inner = self.inner.lock().await;

        if let Some(relay_url) = relay_url {
            inner
                .seen
                .entry(event.id)
                .or_default()
                .insert(relay_url.clone());
        }

        // Capture the shadowed event before the index drops it
        let previous: Option<EventId> = inner.index.address_winner(event);

        let status: SaveEventStatus = inner.index.insert(event);
        if status.is_stored() {
            self.persist_event(event)?;
            if let Some(previous) = previous {
                let _ = fs::remove_file(self.event_path(&previous));
            }
        }
        Ok(status)
    }

    async fn query(&self, filters: &[Filter]) -> Result<Vec<Event>, CacheError> {
        let inner = self.inner.lock().await;
        Ok(inner.index.query(filters))
    }

    async fn event_by_id(&self, event_id: &EventId) -> Result<Option<Event>, CacheError> {
        let inner = self.inner.lock().await;
        Ok(inner.index.event_by_id(event_id).cloned())
    }

    async fn event_seen_on(&self, event_id: &EventId) -> Result<Vec<RelayUrl>, CacheError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .seen
            .get(event_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn profile(&self, public_key: &PublicKey) -> Result<Option<Profile>, CacheError> {
        let mut inner = self.inner.lock().await;

        if let Some(profile) = inner.profiles.get(public_key) {
            return Ok(Some(profile.clone()));
        }

        // Read-through from disk
        let path: PathBuf = self.profile_path(public_key);
        if !path.exists() {
            return Ok(None);
        }
        let profile: Profile = serde_json::from_str(&fs::read_to_string(path)?)?;
        inner.profiles.put(*public_key, profile.clone());
        Ok(Some(profile))
    }

    async fn set_profile(
        &self,
        public_key: PublicKey,
        metadata: Metadata,
    ) -> Result<(), CacheError> {
        let profile: Profile = Profile::new(metadata);
        atomic_write(
            &self.profile_path(&public_key),
            &serde_json::to_string(&profile)?,
        )?;

        let mut inner = self.inner.lock().await;
        inner.profiles.put(public_key, profile);
        Ok(())
    }

    async fn nip05(&self, identifier: &str) -> Result<Option<Nip05Entry>, CacheError> {
        let inner = self.inner.lock().await;
        Ok(inner.nip05.get(identifier).cloned())
    }

    async fn set_nip05(&self, identifier: &str, entry: Nip05Entry) -> Result<(), CacheError> {
        let mut inner = self.inner.lock().await;
        inner.nip05.insert(identifier.to_string(), entry);
        self.persist_nip05(&inner)
    }

    async fn add_unpublished(
        &self,
        event: &Event,
        relays: &[RelayUrl],
    ) -> Result<(), CacheError> {
        if relays.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.lock().await;

        // The event body lives in the regular event store; ephemeral events
        // stay off disk
        if event.is_ephemeral() {
            inner.unpublished_ephemeral.insert(event.id, event.clone());
        } else {
            self.persist_event(event)?;
            inner.index.insert(event);
        }

        for relay in relays.iter() {
            inner
                .unpublished
                .entry(relay.clone())
                .or_default()
                .insert(event.id);
        }
        self.persist_unpublished(&inner)
    }

    async fn unpublished_for(&self, relay_url: &RelayUrl) -> Result<Vec<Event>, CacheError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .unpublished
            .get(relay_url)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| {
                        inner
                            .index
                            .event_by_id(id)
                            .or_else(|| inner.unpublished_ephemeral.get(id))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn mark_published(
        &self,
        event_id: &EventId,
        relay_url: &RelayUrl,
    ) -> Result<(), CacheError> {
        let mut inner = self.inner.lock().await;
        if let Some(ids) = inner.unpublished.get_mut(relay_url) {
            ids.remove(event_id);
            if ids.is_empty() {
                inner.unpublished.remove(relay_url);
            }
            if !inner.unpublished.values().any(|ids| ids.contains(event_id)) {
                inner.unpublished_ephemeral.remove(event_id);
            }
            self.persist_unpublished(&inner)?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut inner = self.inner.lock().await;

        for dir in ["events", "profiles"] {
            let path: PathBuf = self.root.join(dir);
            if path.exists() {
                fs::remove_dir_all(&path)?;
            }
            fs::create_dir_all(&path)?;
        }
        for file in ["nip05.json", "unpublished.json"] {
            let _ = fs::remove_file(self.root.join(file));
        }

        inner.index.clear();
        inner.seen.clear();
        inner.profiles.clear();
        inner.nip05.clear();
        inner.unpublished.clear();
        inner.unpublished_ephemeral.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use plover::{EventBuilder, Keys, Kind};

    use super::*;

    #[tokio::test]
    async fn test_events_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let keys = Keys::generate();
        let event = EventBuilder::text_note("persisted")
            .sign_with_keys(&keys)
            .unwrap();

        {
            let cache = FileCache::open(dir.path()).await.unwrap();
            cache.save_event(&event, &[], None).await.unwrap();
        }

        let cache = FileCache::open(dir.path()).await.unwrap();
        let found = cache.event_by_id(&event.id).await.unwrap().unwrap();
        assert_eq!(found, event);

        // One file per event, sharded by the first two hex chars
        let hex = event.id.to_hex();
        assert!(dir
            .path()
            .join("events")
            .join(&hex[..2])
            .join(format!("{hex}.json"))
            .exists());
    }

    #[tokio::test]
    async fn test_replaceable_shadows_file() {
        let dir = tempfile::tempdir().unwrap();
        let keys = Keys::generate();
        let cache = FileCache::open(dir.path()).await.unwrap();

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
        assert_eq!(result[0].id, new.id);

        let old_hex = old.id.to_hex();
        assert!(!dir
            .path()
            .join("events")
            .join(&old_hex[..2])
            .join(format!("{old_hex}.json"))
            .exists());
    }

    #[tokio::test]
    async fn test_unpublished_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let keys = Keys::generate();
        let event = EventBuilder::text_note("retry").sign_with_keys(&keys).unwrap();
        let relay = RelayUrl::parse("wss://relay.damus.io").unwrap();

        {
            let cache = FileCache::open(dir.path()).await.unwrap();
            cache
                .add_unpublished(&event, std::slice::from_ref(&relay))
                .await
                .unwrap();
        }

        let cache = FileCache::open(dir.path()).await.unwrap();
        let pending = cache.unpublished_for(&relay).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, event.id);

        cache.mark_published(&event.id, &relay).await.unwrap();
        assert!(cache.unpublished_for(&relay).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nip05_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let keys = Keys::generate();
        let entry = Nip05Entry {
            pubkey: keys.public_key(),
            relays: vec![RelayUrl::parse("wss://relay.damus.io").unwrap()],
        };

        {
            let cache = FileCache::open(dir.path()).await.unwrap();
            cache.set_nip05("bob@example.com", entry.clone()).await.unwrap();
        }

        let cache = FileCache::open(dir.path()).await.unwrap();
        assert_eq!(cache.nip05("bob@example.com").await.unwrap(), Some(entry));
    }

    #[tokio::test]
    async fn test_meta_version() {
        let dir = tempfile::tempdir().unwrap();
        {
            FileCache::open(dir.path()).await.unwrap();
        }
        let meta: CacheMeta =
            serde_json::from_str(&fs::read_to_string(dir.path().join("meta.json")).unwrap())
                .unwrap();
        assert_eq!(meta.version, CACHE_FORMAT_VERSION);

        // Future versions are refused
        fs::write(dir.path().join("meta.json"), r#"{"version": 99}"#).unwrap();
        assert!(matches!(
            FileCache::open(dir.path()).await,
            Err(CacheError::UnsupportedVersion(99))
        ));
    }

    #[tokio::test]
    async fn test_profile_read_through() {
        let dir = tempfile::tempdir().unwrap();
        let keys = Keys::generate();

        {
            let cache = FileCache::open(dir.path()).await.unwrap();
            cache
                .set_profile(keys.public_key(), Metadata::new().name("carol"))
                .await
                .unwrap();
        }

        let cache = FileCache::open(dir.path()).await.unwrap();
        let profile = cache.profile(&keys.public_key()).await.unwrap().unwrap();
        assert_eq!(profile.metadata.name.as_deref(), Some("carol"));
    }
}
