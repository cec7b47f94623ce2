// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! NIP19: bech32-encoded entities
//!
//! <https://github.com/nostr-protocol/nips/blob/master/19.md>

use core::fmt;

use bech32::primitives::decode::CheckedHrpstring;
use bech32::{Bech32, Hrp};

use crate::event::address::Address;
use crate::event::id::EventId;
use crate::key::{PublicKey, SecretKey};
use crate::types::url::RelayUrl;
use crate::Kind;

pub const PREFIX_BECH32_SECRET_KEY: &str = "nsec";
pub const PREFIX_BECH32_PUBLIC_KEY: &str = "npub";
pub const PREFIX_BECH32_NOTE_ID: &str = "note";
pub const PREFIX_BECH32_PROFILE: &str = "nprofile";
pub const PREFIX_BECH32_EVENT: &str = "nevent";
pub const PREFIX_BECH32_ADDRESS: &str = "naddr";

// TLV record types
const SPECIAL: u8 = 0;
const RELAY: u8 = 1;
const AUTHOR: u8 = 2;
const KIND: u8 = 3;

/// NIP19 error
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// Bech32 decode error
    Bech32Decode(String),
    /// Bech32 encode error
    Bech32Encode(String),
    /// Wrong prefix
    WrongPrefix,
    /// Key error
    Key(crate::key::Error),
    /// Event id error
    EventId(crate::event::id::Error),
    /// Required TLV field missing
    FieldMissing(String),
    /// Malformed TLV
    TLV,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bech32Decode(e) => write!(f, "Bech32 decode: {e}"),
            Self::Bech32Encode(e) => write!(f, "Bech32 encode: {e}"),
            Self::WrongPrefix => write!(f, "Wrong prefix"),
            Self::Key(e) => write!(f, "Key: {e}"),
            Self::EventId(e) => write!(f, "Event id: {e}"),
            Self::FieldMissing(name) => write!(f, "Field missing: {name}"),
            Self::TLV => write!(f, "TLV (type-length-value) error"),
        }
    }
}

impl From<crate::key::Error> for Error {
    fn from(e: crate::key::Error) -> Self {
        Self::Key(e)
    }
}

impl From<crate::event::id::Error> for Error {
    fn from(e: crate::event::id::Error) -> Self {
        Self::EventId(e)
    }
}

/// Decode bech32 with the classic (not m) checksum variant
fn decode(s: &str) -> Result<(String, Vec<u8>), Error> {
    let checked: CheckedHrpstring = CheckedHrpstring::new::<Bech32>(s)
        .map_err(|e| Error::Bech32Decode(e.to_string()))?;
    let hrp: String = checked.hrp().to_string().to_lowercase();
    let data: Vec<u8> = checked.byte_iter().collect();
    Ok((hrp, data))
}

fn encode(hrp: &str, data: &[u8]) -> Result<String, Error> {
    let hrp: Hrp = Hrp::parse(hrp).map_err(|e| Error::Bech32Encode(e.to_string()))?;
    bech32::encode::<Bech32>(hrp, data).map_err(|e| Error::Bech32Encode(e.to_string()))
}

/// Deserialize from bech32 string
pub trait FromBech32: Sized {
    /// Error
    type Err;

    /// Parse from bech32 string
    fn from_bech32<S>(s: S) -> Result<Self, Self::Err>
    where
        S: AsRef<str>;
}

/// Serialize to bech32 string
pub trait ToBech32 {
    /// Error
    type Err;

    /// Encode to bech32 string
    fn to_bech32(&self) -> Result<String, Self::Err>;
}

impl FromBech32 for SecretKey {
    type Err = Error;

    fn from_bech32<S>(s: S) -> Result<Self, Self::Err>
    where
        S: AsRef<str>,
    {
        let (hrp, data) = decode(s.as_ref())?;
        if hrp != PREFIX_BECH32_SECRET_KEY {
            return Err(Error::WrongPrefix);
        }
        Ok(Self::from_slice(&data)?)
    }
}

impl ToBech32 for SecretKey {
    type Err = Error;

    fn to_bech32(&self) -> Result<String, Self::Err> {
        encode(PREFIX_BECH32_SECRET_KEY, &self.as_secret_bytes())
    }
}

impl FromBech32 for PublicKey {
    type Err = Error;

    fn from_bech32<S>(s: S) -> Result<Self, Self::Err>
    where
        S: AsRef<str>,
    {
        let (hrp, data) = decode(s.as_ref())?;
        if hrp != PREFIX_BECH32_PUBLIC_KEY {
            return Err(Error::WrongPrefix);
        }
        Ok(Self::from_slice(&data)?)
    }
}

impl ToBech32 for PublicKey {
    type Err = Error;

    fn to_bech32(&self) -> Result<String, Self::Err> {
        encode(PREFIX_BECH32_PUBLIC_KEY, &self.to_bytes())
    }
}

impl FromBech32 for EventId {
    type Err = Error;

    fn from_bech32<S>(s: S) -> Result<Self, Self::Err>
    where
        S: AsRef<str>,
    {
        let (hrp, data) = decode(s.as_ref())?;
        if hrp != PREFIX_BECH32_NOTE_ID {
            return Err(Error::WrongPrefix);
        }
        Ok(Self::from_slice(&data)?)
    }
}

impl ToBech32 for EventId {
    type Err = Error;

    fn to_bech32(&self) -> Result<String, Self::Err> {
        encode(PREFIX_BECH32_NOTE_ID, self.as_bytes())
    }
}

/// `nprofile`: pubkey with relay hints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nip19Profile {
    /// Public key
    pub public_key: PublicKey,
    /// Relay hints
    pub relays: Vec<RelayUrl>,
}

impl Nip19Profile {
    /// Compose new profile pointer
    pub fn new<I>(public_key: PublicKey, relays: I) -> Self
    where
        I: IntoIterator<Item = RelayUrl>,
    {
        Self {
            public_key,
            relays: relays.into_iter().collect(),
        }
    }
}

/// `nevent`: event id with optional relays, author and kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nip19Event {
    /// Event id
    pub event_id: EventId,
    /// Author
    pub author: Option<PublicKey>,
    /// Kind
    pub kind: Option<Kind>,
    /// Relay hints
    pub relays: Vec<RelayUrl>,
}

impl Nip19Event {
    /// Compose new event pointer
    pub fn new(event_id: EventId) -> Self {
        Self {
            event_id,
            author: None,
            kind: None,
            relays: Vec::new(),
        }
    }

    /// Set the author
    pub fn author(mut self, author: PublicKey) -> Self {
        self.author = Some(author);
        self
    }

    /// Set the kind
    pub fn kind(mut self, kind: Kind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Add relay hints
    pub fn relays<I>(mut self, relays: I) -> Self
    where
        I: IntoIterator<Item = RelayUrl>,
    {
        self.relays.extend(relays);
        self
    }
}

/// `naddr`: replaceable event address with relay hints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nip19Address {
    /// Coordinate
    pub coordinate: Address,
    /// Relay hints
    pub relays: Vec<RelayUrl>,
}

impl Nip19Address {
    /// Compose new address pointer
    pub fn new<I>(coordinate: Address, relays: I) -> Self
    where
        I: IntoIterator<Item = RelayUrl>,
    {
        Self {
            coordinate,
            relays: relays.into_iter().collect(),
        }
    }
}

/// Any NIP19 entity, for decoding without knowing the prefix ahead of time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Nip19 {
    /// nsec
    Secret(SecretKey),
    /// npub
    Pubkey(PublicKey),
    /// nprofile
    Profile(Nip19Profile),
    /// note
    EventId(EventId),
    /// nevent
    Event(Nip19Event),
    /// naddr
    Address(Nip19Address),
}

struct TlvIter<'a> {
    data: &'a [u8],
}

impl<'a> Iterator for TlvIter<'a> {
    type Item = Result<(u8, &'a [u8]), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }

        if self.data.len() < 2 {
            self.data = &[];
            return Some(Err(Error::TLV));
        }

        let t: u8 = self.data[0];
        let l: usize = self.data[1] as usize;
        if self.data.len() < 2 + l {
            self.data = &[];
            return Some(Err(Error::TLV));
        }

        let v: &[u8] = &self.data[2..2 + l];
        self.data = &self.data[2 + l..];
        Some(Ok((t, v)))
    }
}

fn push_tlv(out: &mut Vec<u8>, t: u8, v: &[u8]) {
    out.push(t);
    out.push(v.len() as u8);
    out.extend_from_slice(v);
}

impl FromBech32 for Nip19Profile {
    type Err = Error;

    fn from_bech32<S>(s: S) -> Result<Self, Self::Err>
    where
        S: AsRef<str>,
    {
        let (hrp, data) = decode(s.as_ref())?;
        if hrp != PREFIX_BECH32_PROFILE {
            return Err(Error::WrongPrefix);
        }

        let mut public_key: Option<PublicKey> = None;
        let mut relays: Vec<RelayUrl> = Vec::new();

        for item in (TlvIter { data: &data }) {
            let (t, v) = item?;
            match t {
                SPECIAL => public_key = Some(PublicKey::from_slice(v)?),
                RELAY => {
                    if let Ok(url) = std::str::from_utf8(v) {
                        if let Ok(url) = RelayUrl::parse(url) {
                            relays.push(url);
                        }
                    }
                }
                // Tolerate unknown TLV types
                _ => {}
            }
        }

        Ok(Self {
            public_key: public_key.ok_or_else(|| Error::FieldMissing(String::from("pubkey")))?,
            relays,
        })
    }
}

impl ToBech32 for Nip19Profile {
    type Err = Error;

    fn to_bech32(&self) -> Result<String, Self::Err> {
        let mut data: Vec<u8> = Vec::new();
        push_tlv(&mut data, SPECIAL, &self.public_key.to_bytes());
        for relay in self.relays.iter() {
            push_tlv(&mut data, RELAY, relay.as_str().as_bytes());
        }
        encode(PREFIX_BECH32_PROFILE, &data)
    }
}

impl FromBech32 for Nip19Event {
    type Err = Error;

    fn from_bech32<S>(s: S) -> Result<Self, Self::Err>
    where
        S: AsRef<str>,
    {
        let (hrp, data) = decode(s.as_ref())?;
        if hrp != PREFIX_BECH32_EVENT {
            return Err(Error::WrongPrefix);
        }

        let mut event_id: Option<EventId> = None;
        let mut author: Option<PublicKey> = None;
        let mut kind: Option<Kind> = None;
        let mut relays: Vec<RelayUrl> = Vec::new();

        for item in (TlvIter { data: &data }) {
            let (t, v) = item?;
            match t {
                SPECIAL => event_id = Some(EventId::from_slice(v)?),
                RELAY => {
                    if let Ok(url) = std::str::from_utf8(v) {
                        if let Ok(url) = RelayUrl::parse(url) {
                            relays.push(url);
                        }
                    }
                }
                AUTHOR => author = Some(PublicKey::from_slice(v)?),
                KIND => {
                    let bytes: [u8; 4] = v.try_into().map_err(|_| Error::TLV)?;
                    kind = u16::try_from(u32::from_be_bytes(bytes))
                        .ok()
                        .map(Kind::from);
                }
                // Tolerate unknown TLV types
                _ => {}
            }
        }

        Ok(Self {
            event_id: event_id.ok_or_else(|| Error::FieldMissing(String::from("event id")))?,
            author,
            kind,
            relays,
        })
    }
}

impl ToBech32 for Nip19Event {
    type Err = Error;

    fn to_bech32(&self) -> Result<String, Self::Err> {
        let mut data: Vec<u8> = Vec::new();
        push_tlv(&mut data, SPECIAL, self.event_id.as_bytes());
        for relay in self.relays.iter() {
            push_tlv(&mut data, RELAY, relay.as_str().as_bytes());
        }
        if let Some(author) = &self.author {
            push_tlv(&mut data, AUTHOR, &author.to_bytes());
        }
        if let Some(kind) = &self.kind {
            push_tlv(&mut data, KIND, &u32::from(kind.as_u16()).to_be_bytes());
        }
        encode(PREFIX_BECH32_EVENT, &data)
    }
}

impl FromBech32 for Nip19Address {
    type Err = Error;

    fn from_bech32<S>(s: S) -> Result<Self, Self::Err>
    where
        S: AsRef<str>,
    {
        let (hrp, data) = decode(s.as_ref())?;
        if hrp != PREFIX_BECH32_ADDRESS {
            return Err(Error::WrongPrefix);
        }

        let mut identifier: Option<String> = None;
        let mut author: Option<PublicKey> = None;
        let mut kind: Option<Kind> = None;
        let mut relays: Vec<RelayUrl> = Vec::new();

        for item in (TlvIter { data: &data }) {
            let (t, v) = item?;
            match t {
                SPECIAL => {
                    identifier =
                        Some(std::str::from_utf8(v).map_err(|_| Error::TLV)?.to_string())
                }
                RELAY => {
                    if let Ok(url) = std::str::from_utf8(v) {
                        if let Ok(url) = RelayUrl::parse(url) {
                            relays.push(url);
                        }
                    }
                }
                AUTHOR => author = Some(PublicKey::from_slice(v)?),
                KIND => {
                    let bytes: [u8; 4] = v.try_into().map_err(|_| Error::TLV)?;
                    kind = u16::try_from(u32::from_be_bytes(bytes))
                        .ok()
                        .map(Kind::from);
                }
                // Tolerate unknown TLV types
                _ => {}
            }
        }

        let coordinate: Address = Address::new(
            kind.ok_or_else(|| Error::FieldMissing(String::from("kind")))?,
            author.ok_or_else(|| Error::FieldMissing(String::from("author")))?,
        )
        .identifier(identifier.ok_or_else(|| Error::FieldMissing(String::from("identifier")))?);

        Ok(Self {
            coordinate,
            relays,
        })
    }
}

impl ToBech32 for Nip19Address {
    type Err = Error;

    fn to_bech32(&self) -> Result<String, Self::Err> {
        let mut data: Vec<u8> = Vec::new();
        push_tlv(&mut data, SPECIAL, self.coordinate.identifier.as_bytes());
        for relay in self.relays.iter() {
            push_tlv(&mut data, RELAY, relay.as_str().as_bytes());
        }
        push_tlv(&mut data, AUTHOR, &self.coordinate.public_key.to_bytes());
        push_tlv(
            &mut data,
            KIND,
            &u32::from(self.coordinate.kind.as_u16()).to_be_bytes(),
        );
        encode(PREFIX_BECH32_ADDRESS, &data)
    }
}

impl FromBech32 for Nip19 {
    type Err = Error;

    fn from_bech32<S>(s: S) -> Result<Self, Self::Err>
    where
        S: AsRef<str>,
    {
        let s: &str = s.as_ref();
        let (hrp, _) = decode(s)?;
        match hrp.as_str() {
            PREFIX_BECH32_SECRET_KEY => Ok(Self::Secret(SecretKey::from_bech32(s)?)),
            PREFIX_BECH32_PUBLIC_KEY => Ok(Self::Pubkey(PublicKey::from_bech32(s)?)),
            PREFIX_BECH32_NOTE_ID => Ok(Self::EventId(EventId::from_bech32(s)?)),
            PREFIX_BECH32_PROFILE => Ok(Self::Profile(Nip19Profile::from_bech32(s)?)),
            PREFIX_BECH32_EVENT => Ok(Self::Event(Nip19Event::from_bech32(s)?)),
            PREFIX_BECH32_ADDRESS => Ok(Self::Address(Nip19Address::from_bech32(s)?)),
            _ => Err(Error::WrongPrefix),
        }
    }
}
