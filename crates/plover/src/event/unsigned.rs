// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Unsigned Event

use core::fmt;

use secp256k1::schnorr::Signature;
use serde::{Deserialize, Serialize};

use super::content;
use super::{Event, EventId, Kind, Tag};
use crate::key::{Keys, PublicKey};
use crate::util::JsonUtil;
use crate::Timestamp;

/// [`UnsignedEvent`] error
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// Event error
    Event(super::Error),
    /// Error serializing or deserializing JSON data
    Json(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event(e) => write!(f, "Event: {e}"),
            Self::Json(e) => write!(f, "Json: {e}"),
        }
    }
}

impl From<super::Error> for Error {
    fn from(e: super::Error) -> Self {
        Self::Event(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

/// Unsigned event: all event fields except the signature, with a lazily
/// computed id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedEvent {
    /// Event ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<EventId>,
    /// Author
    pub pubkey: PublicKey,
    /// Timestamp (seconds)
    pub created_at: Timestamp,
    /// Kind
    pub kind: Kind,
    /// Vector of [`Tag`]
    pub tags: Vec<Tag>,
    /// Content
    pub content: String,
}

impl UnsignedEvent {
    /// Construct new unsigned event
    pub fn new<I, S>(
        public_key: PublicKey,
        created_at: Timestamp,
        kind: Kind,
        tags: I,
        content: S,
    ) -> Self
    where
        I: IntoIterator<Item = Tag>,
        S: Into<String>,
    {
        Self {
            id: None,
            pubkey: public_key,
            created_at,
            kind,
            tags: tags.into_iter().collect(),
            content: content.into(),
        }
    }

    #[inline]
    fn compute_id(&self) -> EventId {
        EventId::new(
            &self.pubkey,
            &self.created_at,
            &self.kind,
            &self.tags,
            &self.content,
        )
    }

    /// Compute and set the id, if not already set
    pub fn ensure_id(&mut self) {
        if self.id.is_none() {
            self.id = Some(self.compute_id());
        }
    }

    /// Verify that the id, if set, matches the canonical serialization hash
    pub fn verify_id(&self) -> Result<(), Error> {
        if let Some(id) = self.id {
            if id != self.compute_id() {
                return Err(Error::Event(super::Error::InvalidId));
            }
        }

        Ok(())
    }

    /// Scan the content for `#hashtag`, `@<bech32>` and `nostr:<bech32>`
    /// tokens, append the derived tags and rewrite mentions to the canonical
    /// `nostr:` form.
    ///
    /// Invalidates a previously computed id.
    pub fn generate_content_tags(&mut self) {
        self.content = content::generate(&self.content, &mut self.tags);
        self.id = None;
    }

    /// Sign with [`Keys`].
    ///
    /// Computes the id if not set, signs it and verifies the composed event.
    pub fn sign_with_keys(mut self, keys: &Keys) -> Result<Event, Error> {
        self.ensure_id();
        // SAFETY: id set above
        let id: EventId = self.id.expect("id set above");
        let sig: Signature = keys.sign_schnorr(id.to_bytes());
        self.add_signature_inner(id, sig)
    }

    /// Add a signature produced externally (ex. by a remote signer).
    ///
    /// Verifies both the id and the signature.
    pub fn add_signature(mut self, sig: Signature) -> Result<Event, Error> {
        self.ensure_id();
        // SAFETY: id set above
        let id: EventId = self.id.expect("id set above");
        self.add_signature_inner(id, sig)
    }

    fn add_signature_inner(self, id: EventId, sig: Signature) -> Result<Event, Error> {
        let event: Event = Event::new(
            id,
            self.pubkey,
            self.created_at,
            self.kind,
            self.tags,
            self.content,
            sig,
        );
        event.verify()?;
        Ok(event)
    }
}

impl From<Event> for UnsignedEvent {
    fn from(event: Event) -> Self {
        Self {
            id: Some(event.id),
            pubkey: event.pubkey,
            created_at: event.created_at,
            kind: event.kind,
            tags: event.tags,
            content: event.content,
        }
    }
}

impl JsonUtil for UnsignedEvent {
    type Err = Error;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let keys =
            Keys::parse("nsec1j5sw4vtgzzvmrjtqynvre0fknyfyysjpul0t2eew50rngdgltxnq0efsa0").unwrap();
        let unsigned = UnsignedEvent::new(
            keys.public_key(),
            Timestamp::from(1234567890),
            Kind::TEXT_NOTE,
            [],
            "Test message",
        );
        let event = unsigned.sign_with_keys(&keys).unwrap();
        assert_eq!(event.id.to_hex().len(), 64);
        assert_eq!(
            event.id.to_hex(),
            "82b19ac763a498b9a66d626e1700cf792cabe26a1f713f66593c42a1a3827502"
        );
        event.verify().unwrap();
    }

    #[test]
    fn test_verify_id() {
        let keys = Keys::generate();
        let mut unsigned =
            UnsignedEvent::new(keys.public_key(), Timestamp::now(), Kind::TEXT_NOTE, [], "a");
        unsigned.ensure_id();
        unsigned.verify_id().unwrap();

        unsigned.content = String::from("b");
        assert!(unsigned.verify_id().is_err());
    }

    #[test]
    fn test_wrong_key_signature_rejected() {
        let keys = Keys::generate();
        let other = Keys::generate();
        let unsigned = UnsignedEvent::new(
            other.public_key(),
            Timestamp::now(),
            Kind::TEXT_NOTE,
            [],
            "test",
        );
        // Signing an event that claims another author must fail verification
        assert!(unsigned.sign_with_keys(&keys).is_err());
    }
}
