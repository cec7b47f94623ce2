// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Event builder

use core::fmt;

use super::{Event, Kind, Tag, UnsignedEvent};
use crate::key::{Keys, PublicKey};
use crate::nips::nip65::RelayMetadata;
use crate::signer::{Signer, SignerError};
use crate::types::url::RelayUrl;
use crate::types::Metadata;
use crate::util::JsonUtil;
use crate::Timestamp;

/// [`EventBuilder`] error
#[derive(Debug)]
pub enum Error {
    /// Unsigned event error
    Unsigned(super::unsigned::Error),
    /// Signer error
    Signer(SignerError),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsigned(e) => write!(f, "Unsigned event: {e}"),
            Self::Signer(e) => write!(f, "Signer: {e}"),
        }
    }
}

impl From<super::unsigned::Error> for Error {
    fn from(e: super::unsigned::Error) -> Self {
        Self::Unsigned(e)
    }
}

impl From<SignerError> for Error {
    fn from(e: SignerError) -> Self {
        Self::Signer(e)
    }
}

/// Event builder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBuilder {
    kind: Kind,
    tags: Vec<Tag>,
    content: String,
    custom_created_at: Option<Timestamp>,
}

impl EventBuilder {
    /// New event builder
    pub fn new<S>(kind: Kind, content: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            kind,
            tags: Vec::new(),
            content: content.into(),
            custom_created_at: None,
        }
    }

    /// Add tag
    #[inline]
    pub fn tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    /// Add tags
    #[inline]
    pub fn tags<I>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = Tag>,
    {
        self.tags.extend(tags);
        self
    }

    /// Use a specific `created_at` instead of the current time
    #[inline]
    pub fn custom_created_at(mut self, created_at: Timestamp) -> Self {
        self.custom_created_at = Some(created_at);
        self
    }

    /// Build an [`UnsignedEvent`] for the given author
    pub fn build(self, public_key: PublicKey) -> UnsignedEvent {
        UnsignedEvent::new(
            public_key,
            self.custom_created_at.unwrap_or_else(Timestamp::now),
            self.kind,
            self.tags,
            self.content,
        )
    }

    /// Build and sign with [`Keys`]
    pub fn sign_with_keys(self, keys: &Keys) -> Result<Event, Error> {
        Ok(self.build(keys.public_key()).sign_with_keys(keys)?)
    }

    /// Build and sign with a [`Signer`]
    pub async fn sign<T>(self, signer: &T) -> Result<Event, Error>
    where
        T: Signer + ?Sized,
    {
        let public_key: PublicKey = signer.get_public_key().await?;
        Ok(signer.sign_event(self.build(public_key)).await?)
    }

    /// Profile metadata (kind 0)
    pub fn metadata(metadata: &Metadata) -> Self {
        Self::new(Kind::METADATA, metadata.as_json())
    }

    /// Short text note (kind 1)
    #[inline]
    pub fn text_note<S>(content: S) -> Self
    where
        S: Into<String>,
    {
        Self::new(Kind::TEXT_NOTE, content)
    }

    /// Relay list metadata (kind 10002, NIP65)
    pub fn relay_list<I>(relays: I) -> Self
    where
        I: IntoIterator<Item = (RelayUrl, Option<RelayMetadata>)>,
    {
        let tags = relays
            .into_iter()
            .map(|(url, metadata)| Tag::relay_metadata(url, metadata));
        Self::new(Kind::RELAY_LIST, "").tags(tags)
    }

    /// Relay authentication event (kind 22242, NIP42)
    pub fn auth<S>(challenge: S, relay_url: RelayUrl) -> Self
    where
        S: Into<String>,
    {
        let challenge: String = challenge.into();
        Self::new(Kind::AUTHENTICATION, "").tags([
            Tag::parse(["relay", relay_url.as_str()]).expect("non-empty tag"),
            Tag::parse(["challenge", challenge.as_str()]).expect("non-empty tag"),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_note() {
        let keys = Keys::generate();
        let event = EventBuilder::text_note("hello world")
            .sign_with_keys(&keys)
            .unwrap();
        assert_eq!(event.kind, Kind::TEXT_NOTE);
        assert_eq!(event.content, "hello world");
        event.verify().unwrap();
    }

    #[test]
    fn test_custom_created_at() {
        let keys = Keys::generate();
        let event = EventBuilder::text_note("hello")
            .custom_created_at(Timestamp::from(1234567890))
            .sign_with_keys(&keys)
            .unwrap();
        assert_eq!(event.created_at, Timestamp::from(1234567890));
    }

    #[test]
    fn test_relay_list() {
        let keys = Keys::generate();
        let event = EventBuilder::relay_list([
            (RelayUrl::parse("wss://relay.damus.io").unwrap(), None),
            (
                RelayUrl::parse("wss://nos.lol").unwrap(),
                Some(RelayMetadata::Read),
            ),
        ])
        .sign_with_keys(&keys)
        .unwrap();
        assert_eq!(event.kind, Kind::RELAY_LIST);
        assert_eq!(event.tags.len(), 2);
        assert_eq!(
            event.tags[1].as_slice(),
            &["r", "wss://nos.lol/", "read"]
        );
    }

    #[test]
    fn test_auth() {
        let keys = Keys::generate();
        let relay_url = RelayUrl::parse("wss://relay.damus.io").unwrap();
        let event = EventBuilder::auth("challenge-string", relay_url)
            .sign_with_keys(&keys)
            .unwrap();
        assert_eq!(event.kind, Kind::AUTHENTICATION);
        assert_eq!(event.tags[0].as_slice(), &["relay", "wss://relay.damus.io/"]);
        assert_eq!(event.tags[1].as_slice(), &["challenge", "challenge-string"]);
    }
}
