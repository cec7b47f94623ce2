// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Event

use core::fmt;

use secp256k1::schnorr::Signature;
use secp256k1::Message;
use serde::{Deserialize, Serialize};

pub mod address;
pub mod builder;
mod content;
pub mod id;
pub mod kind;
pub mod tag;
pub mod unsigned;

pub use self::address::Address;
pub use self::builder::EventBuilder;
pub use self::id::EventId;
pub use self::kind::Kind;
pub use self::tag::Tag;
pub use self::unsigned::UnsignedEvent;
use crate::key::PublicKey;
use crate::nips::nip10;
use crate::util::{JsonUtil, SECP256K1};
use crate::Timestamp;

/// [`Event`] error
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// Invalid event id (not matching the canonical serialization hash)
    InvalidId,
    /// Invalid signature
    InvalidSignature,
    /// Error serializing or deserializing JSON data
    Json(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidId => write!(f, "Invalid event id"),
            Self::InvalidSignature => write!(f, "Invalid signature"),
            Self::Json(e) => write!(f, "Json: {e}"),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

/// Nostr event.
///
/// Immutable once signed: every constructor either comes from the wire or from
/// [`UnsignedEvent`] signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Id
    pub id: EventId,
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
    /// Signature
    pub sig: Signature,
}

impl Event {
    /// Compose event from components.
    ///
    /// This does NOT verify id nor signature.
    pub fn new<I, S>(
        id: EventId,
        public_key: PublicKey,
        created_at: Timestamp,
        kind: Kind,
        tags: I,
        content: S,
        sig: Signature,
    ) -> Self
    where
        I: IntoIterator<Item = Tag>,
        S: Into<String>,
    {
        Self {
            id,
            pubkey: public_key,
            created_at,
            kind,
            tags: tags.into_iter().collect(),
            content: content.into(),
            sig,
        }
    }

    /// Verify that the id matches the canonical serialization hash
    pub fn verify_id(&self) -> Result<(), Error> {
        let id: EventId = EventId::new(
            &self.pubkey,
            &self.created_at,
            &self.kind,
            &self.tags,
            &self.content,
        );
        if id != self.id {
            return Err(Error::InvalidId);
        }
        Ok(())
    }

    /// Verify the Schnorr signature over the id
    pub fn verify_signature(&self) -> Result<(), Error> {
        let message: Message = Message::from_digest(self.id.to_bytes());
        SECP256K1
            .verify_schnorr(&self.sig, &message, self.pubkey.as_x_only())
            .map_err(|_| Error::InvalidSignature)
    }

    /// Verify both id and signature
    pub fn verify(&self) -> Result<(), Error> {
        self.verify_id()?;
        self.verify_signature()
    }

    /// Check if the kind is replaceable
    #[inline]
    pub fn is_replaceable(&self) -> bool {
        self.kind.is_replaceable()
    }

    /// Check if the kind is ephemeral
    #[inline]
    pub fn is_ephemeral(&self) -> bool {
        self.kind.is_ephemeral()
    }

    /// Check if the kind is parameterized replaceable
    #[inline]
    pub fn is_addressable(&self) -> bool {
        self.kind.is_addressable()
    }

    /// Get the replaceable address, if the kind is replaceable or addressable
    pub fn address(&self) -> Option<Address> {
        if self.is_replaceable() {
            Some(Address::new(self.kind, self.pubkey))
        } else if self.is_addressable() {
            Some(
                Address::new(self.kind, self.pubkey)
                    .identifier(self.identifier().unwrap_or_default()),
            )
        } else {
            None
        }
    }

    /// Get the first `d` tag value
    pub fn identifier(&self) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.name() == "d")
            .and_then(|tag| tag.content())
    }

    /// Iterate referenced event ids (`e` tags)
    pub fn event_ids(&self) -> impl Iterator<Item = EventId> + '_ {
        self.tags
            .iter()
            .filter(|tag| tag.name() == "e")
            .filter_map(|tag| tag.content())
            .filter_map(|content| EventId::from_hex(content).ok())
    }

    /// Iterate referenced public keys (`p` tags)
    pub fn public_keys(&self) -> impl Iterator<Item = PublicKey> + '_ {
        self.tags
            .iter()
            .filter(|tag| tag.name() == "p")
            .filter_map(|tag| tag.content())
            .filter_map(|content| PublicKey::from_hex(content).ok())
    }

    /// Get the event this one replies to (NIP10)
    #[inline]
    pub fn reply_to(&self) -> Option<EventId> {
        nip10::reply_to(&self.tags)
    }

    /// Check if the event is expired (NIP40)
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(&Timestamp::now())
    }

    /// Check if the event is expired at a specific timestamp
    pub fn is_expired_at(&self, now: &Timestamp) -> bool {
        self.tags
            .iter()
            .filter(|tag| tag.name() == "expiration")
            .filter_map(|tag| tag.content())
            .filter_map(|content| content.parse::<Timestamp>().ok())
            .any(|expiration| &expiration <= now)
    }
}

impl JsonUtil for Event {
    type Err = Error;
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{"id":"70b10f70c1318967eddf12527799411b1a9780ad9c43858f5e5fcd45486a13a5","pubkey":"379e863e8357163b5bce5d2688dc4f1dcc2d505222fb8d74db600f30535dfdfe","created_at":1612809991,"kind":1,"tags":[],"content":"test","sig":"273a9cd5d11455590f4359500bccb7a89428262b96b3ea87a756b770964472f8c3e87f5d5e64d8d2e859a71462a3f477b554565c4f2f326cb01dd7620db71502"}"#;

    #[test]
    fn test_json_roundtrip() {
        let event = Event::from_json(SAMPLE).unwrap();
        assert_eq!(event.kind, Kind::TEXT_NOTE);
        assert_eq!(event.content, "test");
        assert_eq!(event.as_json(), SAMPLE);
    }

    #[test]
    fn test_verify_signed_event() {
        let json = r#"{"content":"Think about this.\n\nThe most powerful centralized institutions in the world have been replaced by a protocol that protects the individual. #bitcoin\n\nDo you doubt that we can replace everything else?\n\nBullish on the future of humanity\nnostr:nevent1qqs9ljegkuk2m2ewfjlhxy054n6ld5dfngwzuep0ddhs64gc49q0nmqpzdmhxue69uhhyetvv9ukzcnvv5hx7un8qgsw3mfhnrr0l6ll5zzsrtpeufckv2lazc8k3ru5c3wkjtv8vlwngksrqsqqqqqpttgr27","created_at":1703184271,"id":"38acf9b08d06859e49237688a9fd6558c448766f47457236c2331f93538992c6","kind":1,"pubkey":"e8ed3798c6ffebffa08501ac39e271662bfd160f688f94c45d692d8767dd345a","sig":"f76d5ecc8e7de688ac12b9d19edaacdcffb8f0c8fa2a44c00767363af3f04dbc069542ddc5d2f63c94cb5e6ce701589d538cf2db3b1f1211a96596fabb6ecafe","tags":[["e","5fcb28b72cadab2e4cbf7311f4acf5f6d1a99a1c2e642f6b6f0d5518a940f9ec","","mention"],["p","e8ed3798c6ffebffa08501ac39e271662bfd160f688f94c45d692d8767dd345a","","mention"],["t","bitcoin"],["t","bitcoin"]]}"#;
        let event = Event::from_json(json).unwrap();
        event.verify().unwrap();
    }

    #[test]
    fn test_tampered_event_fails_verification() {
        let mut event = Event::from_json(SAMPLE).unwrap();
        event.content = String::from("tampered");
        assert_eq!(event.verify(), Err(Error::InvalidId));
    }

    #[test]
    fn test_address() {
        let mut event = Event::from_json(SAMPLE).unwrap();

        event.kind = Kind::METADATA;
        let address = event.address().unwrap();
        assert_eq!(address.identifier, "");

        event.kind = Kind::from(30023);
        event.tags = vec![Tag::identifier("post-1")];
        let address = event.address().unwrap();
        assert_eq!(address.identifier, "post-1");

        event.kind = Kind::TEXT_NOTE;
        assert!(event.address().is_none());
    }

    #[test]
    fn test_expiration() {
        let mut event = Event::from_json(SAMPLE).unwrap();
        assert!(!event.is_expired());

        event.tags = vec![Tag::expiration(Timestamp::from(1))];
        assert!(event.is_expired());

        event.tags = vec![Tag::expiration(Timestamp::now() + 60)];
        assert!(!event.is_expired());
    }
}
