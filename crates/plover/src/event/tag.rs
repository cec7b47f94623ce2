// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Tag

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::event::id::EventId;
use crate::filter::SingleLetterTag;
use crate::key::PublicKey;
use crate::nips::nip10::Marker;
use crate::nips::nip65::RelayMetadata;
use crate::types::url::RelayUrl;
use crate::Timestamp;

/// [`Tag`] error
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// Tag has no elements
    EmptyTag,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyTag => write!(f, "Tag has no elements"),
        }
    }
}

/// Tag: an ordered, non-empty sequence of strings.
///
/// The first element is the tag name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(Vec<String>);

impl Tag {
    /// Parse tag from a list of strings
    pub fn parse<I, S>(tag: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tag: Vec<String> = tag.into_iter().map(|v| v.into()).collect();

        if tag.is_empty() {
            return Err(Error::EmptyTag);
        }

        Ok(Self(tag))
    }

    /// Get the tag name (first element)
    #[inline]
    pub fn name(&self) -> &str {
        // SAFETY: `parse` rejects empty tags
        &self.0[0]
    }

    /// Get the tag content (second element), if any
    #[inline]
    pub fn content(&self) -> Option<&str> {
        self.0.get(1).map(|s| s.as_str())
    }

    /// Get the single-letter name, if the name is a single ASCII letter
    pub fn single_letter(&self) -> Option<SingleLetterTag> {
        let name: &str = self.name();
        if name.len() == 1 {
            SingleLetterTag::from_char(name.chars().next()?).ok()
        } else {
            None
        }
    }

    /// Compose an `e` tag
    #[inline]
    pub fn event(event_id: EventId) -> Self {
        Self(vec![String::from("e"), event_id.to_hex()])
    }

    /// Compose an `e` tag with relay hint and marker
    pub fn event_with(event_id: EventId, relay_url: Option<RelayUrl>, marker: Option<Marker>) -> Self {
        let mut tag: Vec<String> = vec![String::from("e"), event_id.to_hex()];
        match (relay_url, marker) {
            (relay_url, Some(marker)) => {
                tag.push(relay_url.map(|u| u.to_string()).unwrap_or_default());
                tag.push(marker.to_string());
            }
            (Some(relay_url), None) => tag.push(relay_url.to_string()),
            (None, None) => {}
        }
        Self(tag)
    }

    /// Compose a `p` tag
    #[inline]
    pub fn public_key(public_key: PublicKey) -> Self {
        Self(vec![String::from("p"), public_key.to_hex()])
    }

    /// Compose a `q` tag (quoted event)
    #[inline]
    pub fn quote(event_id: EventId) -> Self {
        Self(vec![String::from("q"), event_id.to_hex()])
    }

    /// Compose a `t` tag
    #[inline]
    pub fn hashtag<S>(hashtag: S) -> Self
    where
        S: Into<String>,
    {
        Self(vec![String::from("t"), hashtag.into()])
    }

    /// Compose a `d` tag
    #[inline]
    pub fn identifier<S>(identifier: S) -> Self
    where
        S: Into<String>,
    {
        Self(vec![String::from("d"), identifier.into()])
    }

    /// Compose an `r` tag with optional NIP65 marker
    pub fn relay_metadata(relay_url: RelayUrl, metadata: Option<RelayMetadata>) -> Self {
        let mut tag: Vec<String> = vec![String::from("r"), relay_url.to_string()];
        if let Some(metadata) = metadata {
            tag.push(metadata.to_string());
        }
        Self(tag)
    }

    /// Compose an `expiration` tag (NIP40)
    #[inline]
    pub fn expiration(timestamp: Timestamp) -> Self {
        Self(vec![String::from("expiration"), timestamp.to_string()])
    }

    /// Get as slice of strings
    #[inline]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Consume and get the inner vector
    #[inline]
    pub fn to_vec(self) -> Vec<String> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_empty() {
        assert_eq!(Tag::parse(Vec::<String>::new()).unwrap_err(), Error::EmptyTag);
    }

    #[test]
    fn test_name_and_content() {
        let tag = Tag::parse(["e", "70b10f70c1318967eddf12527799411b1a9780ad9c43858f5e5fcd45486a13a5"])
            .unwrap();
        assert_eq!(tag.name(), "e");
        assert_eq!(
            tag.content(),
            Some("70b10f70c1318967eddf12527799411b1a9780ad9c43858f5e5fcd45486a13a5")
        );
        assert!(tag.single_letter().is_some());

        let tag = Tag::parse(["expiration", "1700000000"]).unwrap();
        assert!(tag.single_letter().is_none());
    }

    #[test]
    fn test_event_with_marker() {
        let id =
            EventId::from_hex("70b10f70c1318967eddf12527799411b1a9780ad9c43858f5e5fcd45486a13a5")
                .unwrap();
        let tag = Tag::event_with(id, None, Some(Marker::Reply));
        assert_eq!(
            tag.as_slice(),
            &[
                "e",
                "70b10f70c1318967eddf12527799411b1a9780ad9c43858f5e5fcd45486a13a5",
                "",
                "reply"
            ]
        );
    }

    #[test]
    fn test_serde_transparent() {
        let tag = Tag::parse(["t", "rust"]).unwrap();
        assert_eq!(serde_json::to_string(&tag).unwrap(), r#"["t","rust"]"#);
    }
}
