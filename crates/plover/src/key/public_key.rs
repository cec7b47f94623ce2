// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Public key

use core::fmt;
use core::str::FromStr;

use secp256k1::XOnlyPublicKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::Error;
use crate::nips::nip19::FromBech32;

/// Public key (x-only, 32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey(XOnlyPublicKey);

impl PublicKey {
    /// Public key len
    pub const LEN: usize = 32;

    /// Try to parse from `hex` or `bech32`
    pub fn parse<S>(public_key: S) -> Result<Self, Error>
    where
        S: AsRef<str>,
    {
        let public_key: &str = public_key.as_ref();

        if let Ok(public_key) = Self::from_hex(public_key) {
            return Ok(public_key);
        }

        if let Ok(public_key) = Self::from_bech32(public_key) {
            return Ok(public_key);
        }

        Err(Error::InvalidPublicKey)
    }

    /// Parse from hex string
    pub fn from_hex<S>(hex: S) -> Result<Self, Error>
    where
        S: AsRef<str>,
    {
        let mut bytes: [u8; Self::LEN] = [0u8; Self::LEN];
        hex::decode_to_slice(hex.as_ref(), &mut bytes).map_err(|_| Error::InvalidPublicKey)?;
        Self::from_byte_array(bytes)
    }

    /// Parse from 32-byte array
    pub fn from_byte_array(bytes: [u8; Self::LEN]) -> Result<Self, Error> {
        Ok(Self(
            XOnlyPublicKey::from_slice(&bytes).map_err(|_| Error::InvalidPublicKey)?,
        ))
    }

    /// Parse from bytes
    pub fn from_slice(slice: &[u8]) -> Result<Self, Error> {
        Ok(Self(
            XOnlyPublicKey::from_slice(slice).map_err(|_| Error::InvalidPublicKey)?,
        ))
    }

    /// Get as hex string
    #[inline]
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Get as bytes
    #[inline]
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        self.0.serialize()
    }

    /// Get the underlying x-only key
    #[inline]
    pub(crate) fn as_x_only(&self) -> &XOnlyPublicKey {
        &self.0
    }
}

impl From<XOnlyPublicKey> for PublicKey {
    fn from(inner: XOnlyPublicKey) -> Self {
        Self(inner)
    }
}

impl FromStr for PublicKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let public_key: String = String::deserialize(deserializer)?;
        Self::parse(public_key).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        let hex = "f79a99714c761c0e0fea6777a70103d71d75fb7900b0894bfe6c64054807b573";
        let pk = PublicKey::from_hex(hex).unwrap();
        assert_eq!(pk.to_hex(), hex);
    }

    #[test]
    fn test_invalid_hex() {
        assert!(PublicKey::from_hex("deadbeef").is_err());
        assert!(PublicKey::from_hex("not hex at all").is_err());
    }
}
