// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Replaceable event address

use core::fmt;
use core::str::FromStr;

use super::Kind;
use crate::key::{self, PublicKey};

/// [`Address`] error
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// Invalid address format
    InvalidAddress,
    /// Key error
    Key(key::Error),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAddress => write!(f, "Invalid address"),
            Self::Key(e) => write!(f, "Key: {e}"),
        }
    }
}

impl From<key::Error> for Error {
    fn from(e: key::Error) -> Self {
        Self::Key(e)
    }
}

/// Address of a replaceable event: `kind:pubkey:identifier`.
///
/// The identifier is empty for plain replaceable kinds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    /// Kind
    pub kind: Kind,
    /// Author
    pub public_key: PublicKey,
    /// `d` tag value
    pub identifier: String,
}

impl Address {
    /// Compose a new address
    pub fn new(kind: Kind, public_key: PublicKey) -> Self {
        Self {
            kind,
            public_key,
            identifier: String::new(),
        }
    }

    /// Set the identifier (`d` tag value)
    pub fn identifier<S>(mut self, identifier: S) -> Self
    where
        S: Into<String>,
    {
        self.identifier = identifier.into();
        self
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut split = s.splitn(3, ':');
        let kind: Kind = split
            .next()
            .and_then(|k| k.parse::<u16>().ok())
            .map(Kind::from)
            .ok_or(Error::InvalidAddress)?;
        let public_key: PublicKey =
            PublicKey::from_hex(split.next().ok_or(Error::InvalidAddress)?)?;
        let identifier: String = split.next().unwrap_or_default().to_string();
        Ok(Self {
            kind,
            public_key,
            identifier,
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.public_key, self.identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUBKEY: &str = "f79a99714c761c0e0fea6777a70103d71d75fb7900b0894bfe6c64054807b573";

    #[test]
    fn test_roundtrip() {
        let address = Address::new(Kind::from(30023), PublicKey::from_hex(PUBKEY).unwrap())
            .identifier("post-1");
        let s = address.to_string();
        assert_eq!(s, format!("30023:{PUBKEY}:post-1"));
        assert_eq!(Address::from_str(&s).unwrap(), address);
    }

    #[test]
    fn test_empty_identifier() {
        let address = Address::new(Kind::METADATA, PublicKey::from_hex(PUBKEY).unwrap());
        let s = address.to_string();
        assert_eq!(s, format!("0:{PUBKEY}:"));
        assert_eq!(Address::from_str(&s).unwrap(), address);
    }
}
