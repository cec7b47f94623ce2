// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Filters

use core::fmt;
use core::str::FromStr;
use std::collections::{BTreeMap, BTreeSet};

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::{Event, EventId, JsonUtil, Kind, PublicKey, Timestamp};

type GenericTags = BTreeMap<SingleLetterTag, BTreeSet<String>>;

/// [`SingleLetterTag`] error
#[derive(Debug, PartialEq, Eq)]
pub enum SingleLetterTagError {
    /// Invalid char
    InvalidChar,
}

impl std::error::Error for SingleLetterTagError {}

impl fmt::Display for SingleLetterTagError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidChar => write!(f, "expected a single ASCII letter"),
        }
    }
}

/// Single-letter tag name (a-z, A-Z), used as `#<letter>` filter key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SingleLetterTag(char);

impl SingleLetterTag {
    /// Parse from [`char`]
    pub fn from_char(c: char) -> Result<Self, SingleLetterTagError> {
        if c.is_ascii_alphabetic() {
            Ok(Self(c))
        } else {
            Err(SingleLetterTagError::InvalidChar)
        }
    }

    /// Get as char
    #[inline]
    pub fn as_char(&self) -> char {
        self.0
    }

    /// Check if lowercase
    #[inline]
    pub fn is_lowercase(&self) -> bool {
        self.0.is_ascii_lowercase()
    }
}

impl fmt::Display for SingleLetterTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SingleLetterTag {
    type Err = SingleLetterTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::from_char(c),
            _ => Err(SingleLetterTagError::InvalidChar),
        }
    }
}

impl Serialize for SingleLetterTag {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_char(self.0)
    }
}

impl<'de> Deserialize<'de> for SingleLetterTag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let character: char = char::deserialize(deserializer)?;
        Self::from_char(character).map_err(serde::de::Error::custom)
    }
}

/// Subscription filter.
///
/// Conjunctive across fields, disjunctive within a set: an event matches iff
/// every specified field matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// List of [`EventId`]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub ids: Option<BTreeSet<EventId>>,
    /// List of [`PublicKey`]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub authors: Option<BTreeSet<PublicKey>>,
    /// List of kinds
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub kinds: Option<BTreeSet<Kind>>,
    /// Events must be newer than this to pass
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub since: Option<Timestamp>,
    /// Events must be older than this to pass
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub until: Option<Timestamp>,
    /// Maximum number of events to be returned in the initial query
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub limit: Option<usize>,
    /// Generic tag queries (`#<letter>` keys on the wire)
    #[serde(
        flatten,
        serialize_with = "serialize_generic_tags",
        deserialize_with = "deserialize_generic_tags"
    )]
    #[serde(default)]
    pub generic_tags: GenericTags,
}

impl Filter {
    /// Create new empty [`Filter`]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add [`EventId`]
    #[inline]
    pub fn id(self, id: EventId) -> Self {
        self.ids([id])
    }

    /// Add event ids
    pub fn ids<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = EventId>,
    {
        self.ids.get_or_insert_with(BTreeSet::new).extend(ids);
        self
    }

    /// Add author
    #[inline]
    pub fn author(self, author: PublicKey) -> Self {
        self.authors([author])
    }

    /// Add authors
    pub fn authors<I>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = PublicKey>,
    {
        self.authors.get_or_insert_with(BTreeSet::new).extend(authors);
        self
    }

    /// Add kind
    #[inline]
    pub fn kind(self, kind: Kind) -> Self {
        self.kinds([kind])
    }

    /// Add kinds
    pub fn kinds<I>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = Kind>,
    {
        self.kinds.get_or_insert_with(BTreeSet::new).extend(kinds);
        self
    }

    /// Add `#e` tag
    #[inline]
    pub fn event(self, id: EventId) -> Self {
        self.events([id])
    }

    /// Add `#e` tags
    pub fn events<I>(self, events: I) -> Self
    where
        I: IntoIterator<Item = EventId>,
    {
        self.custom_tag(
            SingleLetterTag('e'),
            events.into_iter().map(|id| id.to_hex()),
        )
    }

    /// Add `#p` tag
    #[inline]
    pub fn pubkey(self, pubkey: PublicKey) -> Self {
        self.pubkeys([pubkey])
    }

    /// Add `#p` tags
    pub fn pubkeys<I>(self, pubkeys: I) -> Self
    where
        I: IntoIterator<Item = PublicKey>,
    {
        self.custom_tag(
            SingleLetterTag('p'),
            pubkeys.into_iter().map(|pk| pk.to_hex()),
        )
    }

    /// Add `#t` tag
    pub fn hashtag<S>(self, hashtag: S) -> Self
    where
        S: Into<String>,
    {
        self.custom_tag(SingleLetterTag('t'), [hashtag.into()])
    }

    /// Add `#d` tag
    pub fn identifier<S>(self, identifier: S) -> Self
    where
        S: Into<String>,
    {
        self.custom_tag(SingleLetterTag('d'), [identifier.into()])
    }

    /// Add custom tag constraint
    pub fn custom_tag<I, S>(mut self, tag: SingleLetterTag, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.generic_tags
            .entry(tag)
            .or_default()
            .extend(values.into_iter().map(|v| v.into()));
        self
    }

    /// Add since unix timestamp
    #[inline]
    pub fn since(mut self, since: Timestamp) -> Self {
        self.since = Some(since);
        self
    }

    /// Add until unix timestamp
    #[inline]
    pub fn until(mut self, until: Timestamp) -> Self {
        self.until = Some(until);
        self
    }

    /// Add limit
    #[inline]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check if [`Filter`] is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self == &Filter::default()
    }

    #[inline]
    fn ids_match(&self, event: &Event) -> bool {
        self.ids
            .as_ref()
            .map_or(true, |ids| ids.contains(&event.id))
    }

    #[inline]
    fn authors_match(&self, event: &Event) -> bool {
        self.authors
            .as_ref()
            .map_or(true, |authors| authors.contains(&event.pubkey))
    }

    #[inline]
    fn kind_match(&self, event: &Event) -> bool {
        self.kinds
            .as_ref()
            .map_or(true, |kinds| kinds.contains(&event.kind))
    }

    fn tag_match(&self, event: &Event) -> bool {
        if self.generic_tags.is_empty() {
            return true;
        }

        if event.tags.is_empty() {
            return false;
        }

        self.generic_tags.iter().all(|(tag_name, set)| {
            event.tags.iter().any(|tag| {
                tag.single_letter() == Some(*tag_name)
                    && tag.content().map_or(false, |content| set.contains(content))
            })
        })
    }

    /// Determine if [`Filter`] matches the given [`Event`]
    #[inline]
    pub fn match_event(&self, event: &Event) -> bool {
        self.ids_match(event)
            && self.authors_match(event)
            && self.kind_match(event)
            && self.since.map_or(true, |t| event.created_at >= t)
            && self.until.map_or(true, |t| event.created_at <= t)
            && self.tag_match(event)
    }

    /// Ordinal score used to prioritize cache lookups.
    ///
    /// The most selective constraint present wins:
    /// ids > authors > kinds > tag constraints > time bounds > limit.
    pub fn specificity(&self) -> u8 {
        if self.ids.is_some() {
            6
        } else if self.authors.is_some() {
            5
        } else if self.kinds.is_some() {
            4
        } else if !self.generic_tags.is_empty() {
            3
        } else if self.since.is_some() || self.until.is_some() {
            2
        } else if self.limit.is_some() {
            1
        } else {
            0
        }
    }

    /// Most constrained filter matching exactly `match(self) && match(other)`.
    ///
    /// Returns `None` when the intersection is impossible (empty set
    /// intersection or `since > until`).
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let ids = intersect_sets(&self.ids, &other.ids)?;
        let authors = intersect_sets(&self.authors, &other.authors)?;
        let kinds = intersect_sets(&self.kinds, &other.kinds)?;

        let mut generic_tags: GenericTags = self.generic_tags.clone();
        for (tag, values) in other.generic_tags.iter() {
            match generic_tags.get_mut(tag) {
                Some(current) => {
                    current.retain(|v| values.contains(v));
                    if current.is_empty() {
                        return None;
                    }
                }
                None => {
                    generic_tags.insert(*tag, values.clone());
                }
            }
        }

        let since: Option<Timestamp> = max_option(self.since, other.since);
        let until: Option<Timestamp> = min_option(self.until, other.until);
        if let (Some(since), Some(until)) = (since, until) {
            if since > until {
                return None;
            }
        }

        Some(Self {
            ids,
            authors,
            kinds,
            since,
            until,
            limit: min_option(self.limit, other.limit),
            generic_tags,
        })
    }

    /// Union of two filters of the same shape.
    ///
    /// Succeeds when every field except at most one array-valued field agrees;
    /// the result carries the element-wise union of that field. Returns `None`
    /// when the filters differ in shape or in more than one field.
    pub fn union_on_same_shape(&self, other: &Self) -> Option<Self> {
        if self.since != other.since
            || self.until != other.until
            || self.limit != other.limit
        {
            return None;
        }

        let mut merged: Self = self.clone();
        let mut diverging: usize = 0;

        merge_field(&self.ids, &other.ids, &mut merged.ids, &mut diverging)?;
        merge_field(
            &self.authors,
            &other.authors,
            &mut merged.authors,
            &mut diverging,
        )?;
        merge_field(&self.kinds, &other.kinds, &mut merged.kinds, &mut diverging)?;

        // Same generic tag keys on both sides
        if self.generic_tags.len() != other.generic_tags.len() {
            return None;
        }
        for (tag, values) in other.generic_tags.iter() {
            let current: &mut BTreeSet<String> = merged.generic_tags.get_mut(tag)?;
            if current != values {
                diverging += 1;
                current.extend(values.iter().cloned());
            }
        }

        if diverging <= 1 {
            Some(merged)
        } else {
            None
        }
    }
}

fn intersect_sets<T>(a: &Option<BTreeSet<T>>, b: &Option<BTreeSet<T>>) -> Option<Option<BTreeSet<T>>>
where
    T: Clone + Ord,
{
    match (a, b) {
        (Some(a), Some(b)) => {
            let intersection: BTreeSet<T> = a.intersection(b).cloned().collect();
            if intersection.is_empty() {
                None
            } else {
                Some(Some(intersection))
            }
        }
        (Some(a), None) => Some(Some(a.clone())),
        (None, Some(b)) => Some(Some(b.clone())),
        (None, None) => Some(None),
    }
}

/// Merge one array-valued field for `union_on_same_shape`.
///
/// Fails on shape mismatch (present vs absent); bumps the diverging counter
/// when the sets differ.
fn merge_field<T>(
    a: &Option<BTreeSet<T>>,
    b: &Option<BTreeSet<T>>,
    out: &mut Option<BTreeSet<T>>,
    diverging: &mut usize,
) -> Option<()>
where
    T: Clone + Ord,
{
    match (a, b) {
        (Some(a), Some(b)) => {
            if a != b {
                *diverging += 1;
                *out = Some(a.union(b).cloned().collect());
            }
            Some(())
        }
        (None, None) => Some(()),
        _ => None,
    }
}

fn max_option<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

fn min_option<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

impl JsonUtil for Filter {
    type Err = serde_json::Error;
}

fn serialize_generic_tags<S>(generic_tags: &GenericTags, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(generic_tags.len()))?;
    for (tag, values) in generic_tags.iter() {
        map.serialize_entry(&format!("#{tag}"), values)?;
    }
    map.end()
}

fn deserialize_generic_tags<'de, D>(deserializer: D) -> Result<GenericTags, D::Error>
where
    D: Deserializer<'de>,
{
    struct GenericTagsVisitor;

    impl<'de> Visitor<'de> for GenericTagsVisitor {
        type Value = GenericTags;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("map in which the keys are \"#X\" for some letter X")
        }

        fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
        where
            M: MapAccess<'de>,
        {
            let mut generic_tags = GenericTags::new();
            while let Some(key) = map.next_key::<String>()? {
                let mut chars = key.chars();
                if let (Some('#'), Some(ch), None) = (chars.next(), chars.next(), chars.next()) {
                    let tag: SingleLetterTag =
                        SingleLetterTag::from_char(ch).map_err(serde::de::Error::custom)?;
                    let values: BTreeSet<String> = map.next_value()?;
                    generic_tags.insert(tag, values);
                } else {
                    map.next_value::<serde::de::IgnoredAny>()?;
                }
            }
            Ok(generic_tags)
        }
    }

    deserializer.deserialize_map(GenericTagsVisitor)
}

#[cfg(test)]
mod tests {
    use core::str::FromStr;

    use secp256k1::schnorr::Signature;

    use super::*;
    use crate::Tag;

    fn dummy_event(pubkey: &str, created_at: u64, kind: u16) -> Event {
        Event::new(
            EventId::all_zeros(),
            PublicKey::from_hex(pubkey).unwrap(),
            Timestamp::from(created_at),
            Kind::from(kind),
            [],
            "",
            Signature::from_str("273a9cd5d11455590f4359500bccb7a89428262b96b3ea87a756b770964472f8c3e87f5d5e64d8d2e859a71462a3f477b554565c4f2f326cb01dd7620db71502").unwrap(),
        )
    }

    const PK_A: &str = "f79a99714c761c0e0fea6777a70103d71d75fb7900b0894bfe6c64054807b573";
    const PK_B: &str = "379e863e8357163b5bce5d2688dc4f1dcc2d505222fb8d74db600f30535dfdfe";

    #[test]
    fn test_match_event() {
        let filter = Filter::new()
            .author(PublicKey::from_hex(PK_A).unwrap())
            .kind(Kind::TEXT_NOTE)
            .since(Timestamp::from(1000))
            .until(Timestamp::from(2000));

        assert!(filter.match_event(&dummy_event(PK_A, 1500, 1)));
        assert!(!filter.match_event(&dummy_event(PK_B, 1500, 1)));
        assert!(!filter.match_event(&dummy_event(PK_A, 1500, 3)));
        assert!(!filter.match_event(&dummy_event(PK_A, 999, 1)));
        assert!(!filter.match_event(&dummy_event(PK_A, 2001, 1)));
    }

    #[test]
    fn test_tag_match() {
        let mut event = dummy_event(PK_A, 1500, 1);
        event.tags = vec![
            Tag::public_key(PublicKey::from_hex(PK_B).unwrap()),
            Tag::hashtag("rust"),
        ];

        let filter = Filter::new().pubkey(PublicKey::from_hex(PK_B).unwrap());
        assert!(filter.match_event(&event));

        let filter = Filter::new().hashtag("rust");
        assert!(filter.match_event(&event));

        let filter = Filter::new().hashtag("go");
        assert!(!filter.match_event(&event));

        // Tag constraint never matches an event without tags
        let filter = Filter::new().hashtag("rust");
        assert!(!filter.match_event(&dummy_event(PK_A, 1500, 1)));
    }

    #[test]
    fn test_serialization() {
        let filter = Filter::new()
            .authors([PublicKey::from_hex(PK_A).unwrap()])
            .kind(Kind::TEXT_NOTE)
            .hashtag("rust");
        let json = filter.as_json();
        assert_eq!(
            json,
            format!(r##"{{"authors":["{PK_A}"],"kinds":[1],"#t":["rust"]}}"##)
        );
        assert_eq!(Filter::from_json(json).unwrap(), filter);
    }

    #[test]
    fn test_deserialization_ignores_unknown_keys() {
        let json = r##"{"kinds":[1],"#t":["rust"],"invalid":["x"],"search":"q"}"##;
        let filter = Filter::from_json(json).unwrap();
        assert_eq!(filter, Filter::new().kind(Kind::TEXT_NOTE).hashtag("rust"));
    }

    #[test]
    fn test_specificity() {
        assert_eq!(Filter::new().id(EventId::all_zeros()).specificity(), 6);
        assert_eq!(
            Filter::new()
                .author(PublicKey::from_hex(PK_A).unwrap())
                .kind(Kind::TEXT_NOTE)
                .specificity(),
            5
        );
        assert_eq!(Filter::new().kind(Kind::TEXT_NOTE).specificity(), 4);
        assert_eq!(Filter::new().hashtag("rust").specificity(), 3);
        assert_eq!(Filter::new().since(Timestamp::from(1)).specificity(), 2);
        assert_eq!(Filter::new().limit(10).specificity(), 1);
        assert_eq!(Filter::new().specificity(), 0);
    }

    #[test]
    fn test_intersect() {
        let a = Filter::new()
            .authors([
                PublicKey::from_hex(PK_A).unwrap(),
                PublicKey::from_hex(PK_B).unwrap(),
            ])
            .kind(Kind::TEXT_NOTE)
            .since(Timestamp::from(1000));
        let b = Filter::new()
            .author(PublicKey::from_hex(PK_A).unwrap())
            .until(Timestamp::from(2000));

        let intersection = a.intersect(&b).unwrap();
        assert_eq!(
            intersection,
            Filter::new()
                .author(PublicKey::from_hex(PK_A).unwrap())
                .kind(Kind::TEXT_NOTE)
                .since(Timestamp::from(1000))
                .until(Timestamp::from(2000))
        );
    }

    #[test]
    fn test_intersect_impossible() {
        let a = Filter::new().author(PublicKey::from_hex(PK_A).unwrap());
        let b = Filter::new().author(PublicKey::from_hex(PK_B).unwrap());
        assert!(a.intersect(&b).is_none());

        let a = Filter::new().since(Timestamp::from(2000));
        let b = Filter::new().until(Timestamp::from(1000));
        assert!(a.intersect(&b).is_none());
    }

    #[test]
    fn test_union_on_same_shape() {
        let a = Filter::new()
            .author(PublicKey::from_hex(PK_A).unwrap())
            .kind(Kind::TEXT_NOTE);
        let b = Filter::new()
            .author(PublicKey::from_hex(PK_B).unwrap())
            .kind(Kind::TEXT_NOTE);

        let merged = a.union_on_same_shape(&b).unwrap();
        assert_eq!(
            merged,
            Filter::new()
                .authors([
                    PublicKey::from_hex(PK_A).unwrap(),
                    PublicKey::from_hex(PK_B).unwrap()
                ])
                .kind(Kind::TEXT_NOTE)
        );
    }

    #[test]
    fn test_union_identical() {
        let a = Filter::new().kind(Kind::TEXT_NOTE).limit(10);
        assert_eq!(a.union_on_same_shape(&a.clone()).unwrap(), a);
    }

    #[test]
    fn test_union_shape_mismatch() {
        // Field present on one side only
        let a = Filter::new()
            .author(PublicKey::from_hex(PK_A).unwrap())
            .kind(Kind::TEXT_NOTE);
        let b = Filter::new().kind(Kind::TEXT_NOTE);
        assert!(a.union_on_same_shape(&b).is_none());

        // More than one diverging field
        let a = Filter::new()
            .author(PublicKey::from_hex(PK_A).unwrap())
            .kind(Kind::TEXT_NOTE);
        let b = Filter::new()
            .author(PublicKey::from_hex(PK_B).unwrap())
            .kind(Kind::METADATA);
        assert!(a.union_on_same_shape(&b).is_none());

        // Scalar mismatch
        let a = Filter::new().kind(Kind::TEXT_NOTE).limit(10);
        let b = Filter::new().kind(Kind::TEXT_NOTE).limit(20);
        assert!(a.union_on_same_shape(&b).is_none());

        // Different tag keys
        let a = Filter::new().hashtag("rust");
        let b = Filter::new().identifier("post");
        assert!(a.union_on_same_shape(&b).is_none());
    }
}
