// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Per-user relay list tracker

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use plover::nips::nip65::{self, RelayMetadata};
use plover::{Event, Kind, PublicKey, RelayUrl, Timestamp};
use tokio::sync::RwLock;

/// Default freshness window for tracked relay lists
pub const DEFAULT_TRACKER_TTL: Duration = Duration::from_secs(6 * 60 * 60);

const DEFAULT_CAPACITY: usize = 10_000;
/// A relay list event advertising more than this many relays per marker is
/// truncated
const MAX_RELAYS_PER_MARKER: usize = 8;

/// Where a tracked relay list came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayListSource {
    /// NIP65 relay list metadata event (kind 10002)
    Nip65,
    /// Relay hints from a NIP05 resolution
    Nip05Hint,
    /// Manually configured
    Manual,
}

/// Tracked relay list of one pubkey
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    /// Relays the user reads from
    pub read_relays: HashSet<RelayUrl>,
    /// Relays the user writes to
    pub write_relays: HashSet<RelayUrl>,
    /// Source of the list
    pub source: RelayListSource,
    /// `created_at` of the backing event (zero for manual entries)
    pub event_created_at: Timestamp,
    /// When the entry was last refreshed
    pub last_refresh: Timestamp,
}

impl OutboxEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.last_refresh + ttl > Timestamp::now()
    }
}

/// Tracker lookup outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerStatus {
    /// Entry present and fresh
    Fresh(OutboxEntry),
    /// Entry present but older than the TTL: usable, but should be refreshed
    Stale(OutboxEntry),
    /// Nothing tracked for the pubkey
    Missing,
}

/// Tracks `pubkey -> (read relays, write relays)`, fed by kind 10002 events
/// and NIP05 hints.
pub struct OutboxTracker {
    entries: RwLock<LruCache<PublicKey, OutboxEntry>>,
    blacklist: RwLock<HashSet<RelayUrl>>,
    ttl: Duration,
}

impl std::fmt::Debug for OutboxTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboxTracker")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl Default for OutboxTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TRACKER_TTL)
    }
}

impl OutboxTracker {
    /// New tracker with the given freshness window
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(
                NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            )),
            blacklist: RwLock::new(HashSet::new()),
            ttl,
        }
    }

    /// Freshness window
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Ingest an event. Only kind 10002 is inspected; newer `created_at` wins.
    pub async fn process_event(&self, event: &Event) {
        if event.kind != Kind::RELAY_LIST {
            return;
        }

        let mut read_relays: HashSet<RelayUrl> = HashSet::new();
        let mut write_relays: HashSet<RelayUrl> = HashSet::new();

        for (url, metadata) in nip65::extract_relay_list(event).into_iter() {
            match metadata {
                Some(RelayMetadata::Read) => {
                    insert_capped(&mut read_relays, url);
                }
                Some(RelayMetadata::Write) => {
                    insert_capped(&mut write_relays, url);
                }
                // Unmarked means both
                None => {
                    insert_capped(&mut read_relays, url.clone());
                    insert_capped(&mut write_relays, url);
                }
            }
        }

        let mut entries = self.entries.write().await;
        match entries.get_mut(&event.pubkey) {
            Some(entry)
                if entry.source == RelayListSource::Nip65
                    && entry.event_created_at > event.created_at =>
            {
                // An older relay list never replaces a newer one
            }
            _ => {
                tracing::debug!(
                    "Tracking relay list of {}: {} read, {} write",
                    event.pubkey,
                    read_relays.len(),
                    write_relays.len()
                );
                entries.put(
                    event.pubkey,
                    OutboxEntry {
                        read_relays,
                        write_relays,
                        source: RelayListSource::Nip65,
                        event_created_at: event.created_at,
                        last_refresh: Timestamp::now(),
                    },
                );
            }
        }
    }

    /// Track a relay list from an out-of-band source.
    ///
    /// NIP65-sourced entries always win over hints.
    pub async fn track<I>(&self, public_key: PublicKey, relays: I, source: RelayListSource)
    where
        I: IntoIterator<Item = RelayUrl>,
    {
        let relays: HashSet<RelayUrl> = relays.into_iter().collect();

        let mut entries = self.entries.write().await;
        match entries.get_mut(&public_key) {
            Some(entry) if entry.source == RelayListSource::Nip65 => {
                // Keep the authoritative list, just refresh it
                entry.last_refresh = Timestamp::now();
            }
            _ => {
                entries.put(
                    public_key,
                    OutboxEntry {
                        read_relays: relays.clone(),
                        write_relays: relays,
                        source,
                        event_created_at: Timestamp::zero(),
                        last_refresh: Timestamp::now(),
                    },
                );
            }
        }
    }

    /// Look up the tracked relays for a pubkey
    pub async fn status(&self, public_key: &PublicKey) -> TrackerStatus {
        let mut entries = self.entries.write().await;
        match entries.get(public_key) {
            Some(entry) if entry.is_fresh(self.ttl) => TrackerStatus::Fresh(entry.clone()),
            Some(entry) => TrackerStatus::Stale(entry.clone()),
            None => TrackerStatus::Missing,
        }
    }

    /// Get the tracked entry regardless of freshness
    pub async fn get(&self, public_key: &PublicKey) -> Option<OutboxEntry> {
        match self.status(public_key).await {
            TrackerStatus::Fresh(entry) | TrackerStatus::Stale(entry) => Some(entry),
            TrackerStatus::Missing => None,
        }
    }

    /// Add a relay to the global blacklist
    pub async fn blacklist(&self, url: RelayUrl) {
        let mut blacklist = self.blacklist.write().await;
        blacklist.insert(url);
    }

    /// Check if a relay is blacklisted
    pub async fn is_blacklisted(&self, url: &RelayUrl) -> bool {
        let blacklist = self.blacklist.read().await;
        blacklist.contains(url)
    }

    /// Snapshot of the blacklist
    pub async fn blacklisted(&self) -> HashSet<RelayUrl> {
        self.blacklist.read().await.clone()
    }
}

fn insert_capped(set: &mut HashSet<RelayUrl>, url: RelayUrl) {
    if set.len() < MAX_RELAYS_PER_MARKER {
        set.insert(url);
    }
}

#[cfg(test)]
mod tests {
    use plover::{EventBuilder, Keys};

    use super::*;

    fn relay(s: &str) -> RelayUrl {
        RelayUrl::parse(s).unwrap()
    }

    fn relay_list_event(
        keys: &Keys,
        created_at: u64,
        urls: Vec<(&str, Option<RelayMetadata>)>,
    ) -> Event {
        EventBuilder::relay_list(
            urls.into_iter()
                .map(|(url, metadata)| (relay(url), metadata)),
        )
        .custom_created_at(Timestamp::from(created_at))
        .sign_with_keys(keys)
        .unwrap()
    }

    #[tokio::test]
    async fn test_process_relay_list() {
        let tracker = OutboxTracker::default();
        let keys = Keys::generate();

        let event = relay_list_event(
            &keys,
            1000,
            vec![
                ("wss://both.example.com", None),
                ("wss://read.example.com", Some(RelayMetadata::Read)),
                ("wss://write.example.com", Some(RelayMetadata::Write)),
            ],
        );
        tracker.process_event(&event).await;

        let entry = tracker.get(&keys.public_key()).await.unwrap();
        assert_eq!(entry.source, RelayListSource::Nip65);
        assert!(entry.read_relays.contains(&relay("wss://both.example.com")));
        assert!(entry.read_relays.contains(&relay("wss://read.example.com")));
        assert!(!entry.read_relays.contains(&relay("wss://write.example.com")));
        assert!(entry.write_relays.contains(&relay("wss://both.example.com")));
        assert!(entry.write_relays.contains(&relay("wss://write.example.com")));
    }

    #[tokio::test]
    async fn test_newer_event_wins() {
        let tracker = OutboxTracker::default();
        let keys = Keys::generate();

        let newer = relay_list_event(&keys, 2000, vec![("wss://new.example.com", None)]);
        let older = relay_list_event(&keys, 1000, vec![("wss://old.example.com", None)]);

        tracker.process_event(&newer).await;
        tracker.process_event(&older).await;

        let entry = tracker.get(&keys.public_key()).await.unwrap();
        assert!(entry.write_relays.contains(&relay("wss://new.example.com")));
        assert!(!entry.write_relays.contains(&relay("wss://old.example.com")));
    }

    #[tokio::test]
    async fn test_hint_does_not_replace_nip65() {
        let tracker = OutboxTracker::default();
        let keys = Keys::generate();

        let event = relay_list_event(&keys, 1000, vec![("wss://real.example.com", None)]);
        tracker.process_event(&event).await;

        tracker
            .track(
                keys.public_key(),
                [relay("wss://hint.example.com")],
                RelayListSource::Nip05Hint,
            )
            .await;

        let entry = tracker.get(&keys.public_key()).await.unwrap();
        assert_eq!(entry.source, RelayListSource::Nip65);
        assert!(entry.write_relays.contains(&relay("wss://real.example.com")));
    }

    #[tokio::test]
    async fn test_status() {
        let tracker = OutboxTracker::default();
        let keys = Keys::generate();

        assert_eq!(tracker.status(&keys.public_key()).await, TrackerStatus::Missing);

        tracker
            .track(
                keys.public_key(),
                [relay("wss://manual.example.com")],
                RelayListSource::Manual,
            )
            .await;
        assert!(matches!(
            tracker.status(&keys.public_key()).await,
            TrackerStatus::Fresh(..)
        ));

        // A zero TTL makes everything stale immediately
        let tracker = OutboxTracker::new(Duration::ZERO);
        tracker
            .track(
                keys.public_key(),
                [relay("wss://manual.example.com")],
                RelayListSource::Manual,
            )
            .await;
        assert!(matches!(
            tracker.status(&keys.public_key()).await,
            TrackerStatus::Stale(..)
        ));
    }

    #[tokio::test]
    async fn test_blacklist() {
        let tracker = OutboxTracker::default();
        let url = relay("wss://spam.example.com");
        assert!(!tracker.is_blacklisted(&url).await);
        tracker.blacklist(url.clone()).await;
        assert!(tracker.is_blacklisted(&url).await);
    }
}
