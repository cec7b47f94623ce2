// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Secret key

use core::fmt;
use core::str::FromStr;

use secp256k1::rand::rngs::OsRng;
use secp256k1::rand::{CryptoRng, Rng};

use super::Error;
use crate::nips::nip19::FromBech32;

/// Secret key (32 bytes)
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(secp256k1::SecretKey);

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey(<redacted>)")
    }
}

impl SecretKey {
    /// Secret key len
    pub const LEN: usize = 32;

    /// Try to parse from `hex` or `bech32`
    pub fn parse<S>(secret_key: S) -> Result<Self, Error>
    where
        S: AsRef<str>,
    {
        let secret_key: &str = secret_key.as_ref();

        if let Ok(secret_key) = Self::from_hex(secret_key) {
            return Ok(secret_key);
        }

        if let Ok(secret_key) = Self::from_bech32(secret_key) {
            return Ok(secret_key);
        }

        Err(Error::InvalidSecretKey)
    }

    /// Parse from hex string
    pub fn from_hex<S>(hex: S) -> Result<Self, Error>
    where
        S: AsRef<str>,
    {
        let mut bytes: [u8; Self::LEN] = [0u8; Self::LEN];
        hex::decode_to_slice(hex.as_ref(), &mut bytes).map_err(|_| Error::InvalidSecretKey)?;
        Self::from_slice(&bytes)
    }

    /// Parse from bytes
    pub fn from_slice(slice: &[u8]) -> Result<Self, Error> {
        Ok(Self(
            secp256k1::SecretKey::from_slice(slice).map_err(|_| Error::InvalidSecretKey)?,
        ))
    }

    /// Generate a random secret key using the OS random number generator
    #[inline]
    pub fn generate() -> Self {
        Self::generate_with_rng(&mut OsRng)
    }

    /// Generate a random secret key with a custom RNG
    pub fn generate_with_rng<R>(rng: &mut R) -> Self
    where
        R: Rng + CryptoRng,
    {
        Self(secp256k1::SecretKey::new(rng))
    }

    /// Get as bytes
    #[inline]
    pub fn as_secret_bytes(&self) -> [u8; Self::LEN] {
        self.0.secret_bytes()
    }

    /// Get as hex string
    #[inline]
    pub fn to_secret_hex(&self) -> String {
        hex::encode(self.as_secret_bytes())
    }

    /// Get the underlying secp256k1 key
    #[inline]
    pub(crate) fn as_secp(&self) -> &secp256k1::SecretKey {
        &self.0
    }
}

impl From<secp256k1::SecretKey> for SecretKey {
    fn from(inner: secp256k1::SecretKey) -> Self {
        Self(inner)
    }
}

impl FromStr for SecretKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
