// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! NIP21: `nostr:` URI scheme
//!
//! <https://github.com/nostr-protocol/nips/blob/master/21.md>

use core::fmt;

use super::nip19::{self, FromBech32, Nip19, ToBech32};

/// URI scheme
pub const SCHEME: &str = "nostr";

/// NIP21 error
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// NIP19 error
    NIP19(nip19::Error),
    /// Invalid URI
    InvalidURI,
    /// Secret keys are not a valid URI payload
    SecretKeyNotAllowed,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NIP19(e) => write!(f, "NIP19: {e}"),
            Self::InvalidURI => write!(f, "Invalid nostr URI"),
            Self::SecretKeyNotAllowed => write!(f, "Secret keys can't be shared via nostr URI"),
        }
    }
}

impl From<nip19::Error> for Error {
    fn from(e: nip19::Error) -> Self {
        Self::NIP19(e)
    }
}

/// A `nostr:` URI payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Nip21 {
    /// npub
    Pubkey(crate::PublicKey),
    /// nprofile
    Profile(nip19::Nip19Profile),
    /// note
    EventId(crate::EventId),
    /// nevent
    Event(nip19::Nip19Event),
    /// naddr
    Address(nip19::Nip19Address),
}

impl Nip21 {
    /// Parse a `nostr:<bech32>` URI
    pub fn parse<S>(uri: S) -> Result<Self, Error>
    where
        S: AsRef<str>,
    {
        let uri: &str = uri.as_ref();
        let entity: &str = uri
            .strip_prefix("nostr:")
            .ok_or(Error::InvalidURI)?;

        match Nip19::from_bech32(entity)? {
            Nip19::Secret(..) => Err(Error::SecretKeyNotAllowed),
            Nip19::Pubkey(inner) => Ok(Self::Pubkey(inner)),
            Nip19::Profile(inner) => Ok(Self::Profile(inner)),
            Nip19::EventId(inner) => Ok(Self::EventId(inner)),
            Nip19::Event(inner) => Ok(Self::Event(inner)),
            Nip19::Address(inner) => Ok(Self::Address(inner)),
        }
    }

    /// Serialize to `nostr:<bech32>` URI
    pub fn to_nostr_uri(&self) -> Result<String, Error> {
        let bech32: String = match self {
            Self::Pubkey(inner) => inner.to_bech32()?,
            Self::Profile(inner) => inner.to_bech32()?,
            Self::EventId(inner) => inner.to_bech32()?,
            Self::Event(inner) => inner.to_bech32()?,
            Self::Address(inner) => inner.to_bech32()?,
        };
        Ok(format!("{SCHEME}:{bech32}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PublicKey;

    const NPUB: &str = "npub177dfju2vwcwqurl2vam6wqgr6uwht7meqzcgjjl7d3jq2jq8k4esskzh86";

    #[test]
    fn test_parse_pubkey_uri() {
        let uri = format!("nostr:{NPUB}");
        match Nip21::parse(&uri).unwrap() {
            Nip21::Pubkey(pk) => {
                assert_eq!(
                    pk,
                    PublicKey::from_hex(
                        "f79a99714c761c0e0fea6777a70103d71d75fb7900b0894bfe6c64054807b573"
                    )
                    .unwrap()
                );
            }
            other => panic!("wrong entity: {other:?}"),
        }
    }

    #[test]
    fn test_roundtrip() {
        let uri = format!("nostr:{NPUB}");
        let parsed = Nip21::parse(&uri).unwrap();
        assert_eq!(parsed.to_nostr_uri().unwrap(), uri);
    }

    #[test]
    fn test_missing_scheme() {
        assert_eq!(Nip21::parse(NPUB).unwrap_err(), Error::InvalidURI);
    }

    #[test]
    fn test_secret_key_rejected() {
        let uri = "nostr:nsec1j5sw4vtgzzvmrjtqynvre0fknyfyysjpul0t2eew50rngdgltxnq0efsa0";
        assert_eq!(Nip21::parse(uri).unwrap_err(), Error::SecretKeyNotAllowed);
    }
}
