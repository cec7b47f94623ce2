// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Event cache for Nostr clients.
//!
//! The [`Cache`] trait is the persistence seam of the client: events, profile
//! metadata, NIP05 resolutions and unpublished events all go through it. Two
//! reference stores are provided: [`MemoryCache`] and [`FileCache`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub use async_trait::async_trait;
use plover::{Event, EventId, Filter, Metadata, PublicKey, RelayUrl, Timestamp};
use serde::{Deserialize, Serialize};

mod error;
mod fs;
mod index;
mod memory;

pub use self::error::CacheError;
pub use self::fs::FileCache;
pub use self::memory::{MemoryCache, MemoryCacheOptions};

/// Default profile freshness window
pub const DEFAULT_PROFILE_TTL: Duration = Duration::from_secs(60 * 60);

/// Cache backend kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// In-memory
    Memory,
    /// File-backed
    FileSystem,
    /// Custom
    Custom(String),
}

/// Cached profile entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Profile metadata
    pub metadata: Metadata,
    /// When the metadata was fetched
    pub fetched_at: Timestamp,
}

impl Profile {
    /// Compose a new entry fetched now
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata,
            fetched_at: Timestamp::now(),
        }
    }

    /// Check if the entry is older than `ttl`
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.fetched_at + ttl < Timestamp::now()
    }
}

/// Cached NIP05 resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nip05Entry {
    /// Resolved public key
    pub pubkey: PublicKey,
    /// Relay hints
    #[serde(default)]
    pub relays: Vec<RelayUrl>,
}

/// Outcome of [`Cache::save_event`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveEventStatus {
    /// Stored
    Stored,
    /// Already known (idempotent insert)
    Duplicate,
    /// Rejected: ephemeral events are never persisted
    Ephemeral,
    /// Rejected: an event with the same replaceable address and a newer
    /// timestamp is already stored
    Shadowed,
}

impl SaveEventStatus {
    /// Check if the event was stored
    #[inline]
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored)
    }
}

/// Event cache abstraction.
///
/// All operations may suspend. Implementations must honour replaceable
/// semantics: for a replaceable kind at most one event per address is
/// returned by queries, the newest one.
#[async_trait]
pub trait Cache: fmt::Debug + Send + Sync {
    /// Backend kind
    fn backend(&self) -> Backend;

    /// Insert or update an event.
    ///
    /// `filters` are the subscription filters the event was fetched with, used
    /// by stores that maintain filter-shaped secondary indices. `relay_url`
    /// records where the event was seen.
    async fn save_event(
        &self,
        event: &Event,
        filters: &[Filter],
        relay_url: Option<&RelayUrl>,
    ) -> Result<SaveEventStatus, CacheError>;

    /// Query events matching the union of `filters`
    async fn query(&self, filters: &[Filter]) -> Result<Vec<Event>, CacheError>;

    /// Get an event by id
    async fn event_by_id(&self, event_id: &EventId) -> Result<Option<Event>, CacheError>;

    /// Relays an event id has been seen on
    async fn event_seen_on(&self, event_id: &EventId) -> Result<Vec<RelayUrl>, CacheError>;

    /// Get a cached profile
    async fn profile(&self, public_key: &PublicKey) -> Result<Option<Profile>, CacheError>;

    /// Store a profile, marking it fetched now
    async fn set_profile(
        &self,
        public_key: PublicKey,
        metadata: Metadata,
    ) -> Result<(), CacheError>;

    /// Get a cached NIP05 resolution
    async fn nip05(&self, identifier: &str) -> Result<Option<Nip05Entry>, CacheError>;

    /// Store a NIP05 resolution
    async fn set_nip05(&self, identifier: &str, entry: Nip05Entry) -> Result<(), CacheError>;

    /// Track an event awaiting publish confirmation on the given relays
    async fn add_unpublished(
        &self,
        event: &Event,
        relays: &[RelayUrl],
    ) -> Result<(), CacheError>;

    /// Events still awaiting publish on a relay
    async fn unpublished_for(&self, relay_url: &RelayUrl) -> Result<Vec<Event>, CacheError>;

    /// Mark an event as published on a relay
    async fn mark_published(
        &self,
        event_id: &EventId,
        relay_url: &RelayUrl,
    ) -> Result<(), CacheError>;

    /// Wipe the whole cache
    async fn clear(&self) -> Result<(), CacheError>;
}

#[async_trait]
impl Cache for Arc<dyn Cache> {
    fn backend(&self) -> Backend {
        self.as_ref().backend()
    }

    async fn save_event(
        &self,
        event: &Event,
        filters: &[Filter],
        relay_url: Option<&RelayUrl>,
    ) -> Result<SaveEventStatus, CacheError> {
        self.as_ref().save_event(event, filters, relay_url).await
    }

    async fn query(&self, filters: &[Filter]) -> Result<Vec<Event>, CacheError> {
        self.as_ref().query(filters).await
    }

    async fn event_by_id(&self, event_id: &EventId) -> Result<Option<Event>, CacheError> {
        self.as_ref().event_by_id(event_id).await
    }

    async fn event_seen_on(&self, event_id: &EventId) -> Result<Vec<RelayUrl>, CacheError> {
        self.as_ref().event_seen_on(event_id).await
    }

    async fn profile(&self, public_key: &PublicKey) -> Result<Option<Profile>, CacheError> {
        self.as_ref().profile(public_key).await
    }

    async fn set_profile(
        &self,
        public_key: PublicKey,
        metadata: Metadata,
    ) -> Result<(), CacheError> {
        self.as_ref().set_profile(public_key, metadata).await
    }

    async fn nip05(&self, identifier: &str) -> Result<Option<Nip05Entry>, CacheError> {
        self.as_ref().nip05(identifier).await
    }

    async fn set_nip05(&self, identifier: &str, entry: Nip05Entry) -> Result<(), CacheError> {
        self.as_ref().set_nip05(identifier, entry).await
    }

    async fn add_unpublished(
        &self,
        event: &Event,
        relays: &[RelayUrl],
    ) -> Result<(), CacheError> {
        self.as_ref().add_unpublished(event, relays).await
    }

    async fn unpublished_for(&self, relay_url: &RelayUrl) -> Result<Vec<Event>, CacheError> {
        self.as_ref().unpublished_for(relay_url).await
    }

    async fn mark_published(
        &self,
        event_id: &EventId,
        relay_url: &RelayUrl,
    ) -> Result<(), CacheError> {
        self.as_ref().mark_published(event_id, relay_url).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.as_ref().clear().await
    }
}
