// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! In-memory event index shared by the reference stores

use std::collections::{BTreeSet, HashMap};

use plover::{Event, EventId, Filter, Timestamp};

use crate::SaveEventStatus;

/// Key of the descending time index. Timestamps are inverted so that plain
/// forward iteration yields newest-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct TimeKey {
    inverted_created_at: u64,
    event_id: EventId,
}

impl TimeKey {
    fn new(created_at: Timestamp, event_id: EventId) -> Self {
        Self {
            inverted_created_at: u64::MAX - created_at.as_u64(),
            event_id,
        }
    }
}

/// Event index: id map, replaceable-address map, tag inverted index and a
/// descending time index.
#[derive(Debug, Default)]
pub(crate) struct EventIndex {
    events: HashMap<EventId, Event>,
    /// `kind:pubkey:identifier` -> current winner
    addresses: HashMap<String, EventId>,
    /// `(tag name, value)` -> event ids
    tags: HashMap<(char, String), BTreeSet<EventId>>,
    by_time: BTreeSet<TimeKey>,
}

impl EventIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    /// Insert an event, honouring replaceable semantics.
    pub(crate) fn insert(&mut self, event: &Event) -> SaveEventStatus {
        if event.is_ephemeral() {
            return SaveEventStatus::Ephemeral;
        }

        if self.events.contains_key(&event.id) {
            return SaveEventStatus::Duplicate;
        }

        // Replaceable: only the newest event per address survives
        if let Some(address) = event.address() {
            let address: String = address.to_string();
            if let Some(current_id) = self.addresses.get(&address).copied() {
                let newer: bool = match self.events.get(&current_id) {
                    Some(current) => {
                        event.created_at > current.created_at
                            || (event.created_at == current.created_at
                                && event.id < current.id)
                    }
                    None => true,
                };
                if !newer {
                    return SaveEventStatus::Shadowed;
                }
                self.remove(&current_id);
            }
            self.addresses.insert(address, event.id);
        }

        for tag in event.tags.iter() {
            if let (Some(letter), Some(content)) = (tag.single_letter(), tag.content()) {
                self.tags
                    .entry((letter.as_char(), content.to_string()))
                    .or_default()
                    .insert(event.id);
            }
        }
        self.by_time.insert(TimeKey::new(event.created_at, event.id));
        self.events.insert(event.id, event.clone());

        SaveEventStatus::Stored
    }

    fn remove(&mut self, event_id: &EventId) {
        if let Some(event) = self.events.remove(event_id) {
            self.by_time.remove(&TimeKey::new(event.created_at, event.id));
            for tag in event.tags.iter() {
                if let (Some(letter), Some(content)) = (tag.single_letter(), tag.content()) {
                    if let Some(set) = self.tags.get_mut(&(letter.as_char(), content.to_string()))
                    {
                        set.remove(event_id);
                        if set.is_empty() {
                            self.tags.remove(&(letter.as_char(), content.to_string()));
                        }
                    }
                }
            }
        }
    }

    /// Evict the oldest events down to `max` entries
    pub(crate) fn truncate(&mut self, max: usize) {
        while self.events.len() > max {
            let oldest: Option<EventId> =
                self.by_time.iter().next_back().map(|key| key.event_id);
            match oldest {
                Some(event_id) => self.remove(&event_id),
                None => break,
            }
        }
    }

    pub(crate) fn event_by_id(&self, event_id: &EventId) -> Option<&Event> {
        self.events.get(event_id)
    }

    /// Current winner for the event's replaceable address, if any
    pub(crate) fn address_winner(&self, event: &Event) -> Option<EventId> {
        let address: String = event.address()?.to_string();
        self.addresses.get(&address).copied()
    }

    /// Events matching a single filter, newest first, respecting `limit`
    fn query_single(&self, filter: &Filter) -> Vec<&Event> {
        let mut matches: Vec<&Event> = Vec::new();

        // Direct id lookups skip the scan entirely
        if let Some(ids) = &filter.ids {
            let mut matches: Vec<&Event> = ids
                .iter()
                .filter_map(|id| self.events.get(id))
                .filter(|event| filter.match_event(event))
                .collect();
            matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            if let Some(limit) = filter.limit {
                matches.truncate(limit);
            }
            return matches;
        }

        for key in self.by_time.iter() {
            if let Some(limit) = filter.limit {
                if matches.len() >= limit {
                    break;
                }
            }
            if let Some(event) = self.events.get(&key.event_id) {
                if filter.match_event(event) {
                    matches.push(event);
                }
            }
        }

        matches
    }

    /// Events matching the union of `filters`, newest first, deduplicated
    pub(crate) fn query(&self, filters: &[Filter]) -> Vec<Event> {
        let mut seen: BTreeSet<EventId> = BTreeSet::new();
        let mut result: Vec<Event> = Vec::new();

        for filter in filters.iter() {
            for event in self.query_single(filter) {
                if seen.insert(event.id) {
                    result.push(event.clone());
                }
            }
        }

        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result
    }

    pub(crate) fn clear(&mut self) {
        self.events.clear();
        self.addresses.clear();
        self.tags.clear();
        self.by_time.clear();
    }
}

#[cfg(test)]
mod tests {
    use plover::{EventBuilder, Filter, Keys, Kind, Metadata, Tag};

    use super::*;

    #[test]
    fn test_replaceable_semantics() {
        let keys = Keys::generate();
        let mut index = EventIndex::new();

        let old = EventBuilder::metadata(&Metadata::new().name("old"))
            .custom_created_at(Timestamp::from(1000))
            .sign_with_keys(&keys)
            .unwrap();
        let new = EventBuilder::metadata(&Metadata::new().name("new"))
            .custom_created_at(Timestamp::from(2000))
            .sign_with_keys(&keys)
            .unwrap();

        assert_eq!(index.insert(&old), SaveEventStatus::Stored);
        assert_eq!(index.insert(&new), SaveEventStatus::Stored);

        // Newest wins, older one is gone
        let result = index.query(&[Filter::new()
            .author(keys.public_key())
            .kind(Kind::METADATA)]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, new.id);
        assert!(index.event_by_id(&old.id).is_none());

        // Re-inserting the shadowed event is rejected
        assert_eq!(index.insert(&old), SaveEventStatus::Shadowed);
    }

    #[test]
    fn test_idempotent_insert() {
        let keys = Keys::generate();
        let mut index = EventIndex::new();
        let event = EventBuilder::text_note("hi").sign_with_keys(&keys).unwrap();

        assert_eq!(index.insert(&event), SaveEventStatus::Stored);
        assert_eq!(index.insert(&event), SaveEventStatus::Duplicate);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_ephemeral_never_stored() {
        let keys = Keys::generate();
        let mut index = EventIndex::new();
        let event = EventBuilder::new(Kind::from(20001), "eph")
            .sign_with_keys(&keys)
            .unwrap();

        assert_eq!(index.insert(&event), SaveEventStatus::Ephemeral);
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn test_addressable_identifier_key() {
        let keys = Keys::generate();
        let mut index = EventIndex::new();

        let a = EventBuilder::new(Kind::from(30023), "a")
            .tag(Tag::identifier("post-1"))
            .custom_created_at(Timestamp::from(1000))
            .sign_with_keys(&keys)
            .unwrap();
        let b = EventBuilder::new(Kind::from(30023), "b")
            .tag(Tag::identifier("post-2"))
            .custom_created_at(Timestamp::from(1000))
            .sign_with_keys(&keys)
            .unwrap();

        index.insert(&a);
        index.insert(&b);

        // Different identifiers are independent addresses
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_limit_and_order() {
        let keys = Keys::generate();
        let mut index = EventIndex::new();

        for i in 0..10u64 {
            let event = EventBuilder::text_note(format!("note {i}"))
                .custom_created_at(Timestamp::from(1000 + i))
                .sign_with_keys(&keys)
                .unwrap();
            index.insert(&event);
        }

        let result = index.query(&[Filter::new().kind(Kind::TEXT_NOTE).limit(3)]);
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].created_at, Timestamp::from(1009));
        assert_eq!(result[2].created_at, Timestamp::from(1007));
    }

    #[test]
    fn test_truncate_evicts_oldest() {
        let keys = Keys::generate();
        let mut index = EventIndex::new();

        for i in 0..5u64 {
            let event = EventBuilder::text_note(format!("note {i}"))
                .custom_created_at(Timestamp::from(1000 + i))
                .sign_with_keys(&keys)
                .unwrap();
            index.insert(&event);
        }

        index.truncate(2);
        assert_eq!(index.len(), 2);
        let remaining = index.query(&[Filter::new()]);
        assert_eq!(remaining[0].created_at, Timestamp::from(1004));
        assert_eq!(remaining[1].created_at, Timestamp::from(1003));
    }

    #[test]
    fn test_tag_query() {
        let keys = Keys::generate();
        let mut index = EventIndex::new();

        let tagged = EventBuilder::text_note("tagged")
            .tag(Tag::hashtag("rust"))
            .sign_with_keys(&keys)
            .unwrap();
        let plain = EventBuilder::text_note("plain").sign_with_keys(&keys).unwrap();
        index.insert(&tagged);
        index.insert(&plain);

        let result = index.query(&[Filter::new().hashtag("rust")]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, tagged.id);
    }
}
