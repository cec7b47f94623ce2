// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Keys

use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::str::FromStr;
use std::sync::OnceLock;

use async_trait::async_trait;
use secp256k1::schnorr::Signature;
use secp256k1::{Keypair, Message, XOnlyPublicKey};

pub mod public_key;
pub mod secret_key;

pub use self::public_key::PublicKey;
pub use self::secret_key::SecretKey;
use crate::signer::{Signer, SignerBackend, SignerError};
use crate::util::SECP256K1;
use crate::{Event, UnsignedEvent};

/// [`Keys`] error
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// Invalid secret key
    InvalidSecretKey,
    /// Invalid public key
    InvalidPublicKey,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSecretKey => write!(f, "Invalid secret key"),
            Self::InvalidPublicKey => write!(f, "Invalid public key"),
        }
    }
}

/// Nostr keys
#[derive(Clone)]
pub struct Keys {
    /// Public key
    pub public_key: PublicKey,
    secret_key: SecretKey,
    key_pair: OnceLock<Keypair>,
}

impl fmt::Debug for Keys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keys")
            .field("public_key", &self.public_key)
            .finish()
    }
}

impl PartialEq for Keys {
    fn eq(&self, other: &Self) -> bool {
        self.public_key == other.public_key
    }
}

impl Eq for Keys {}

impl PartialOrd for Keys {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Keys {
    fn cmp(&self, other: &Self) -> Ordering {
        self.public_key.cmp(&other.public_key)
    }
}

impl Hash for Keys {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.public_key.hash(state)
    }
}

impl Keys {
    /// Initialize nostr keys from a secret key.
    ///
    /// This derives the [`PublicKey`] immediately; the [`Keypair`] is built lazily.
    pub fn new(secret_key: SecretKey) -> Self {
        let (public_key, _parity) =
            XOnlyPublicKey::from_keypair(&Keypair::from_secret_key(&SECP256K1, secret_key.as_secp()));

        Self {
            public_key: PublicKey::from(public_key),
            secret_key,
            key_pair: OnceLock::new(),
        }
    }

    /// Generate random keys using the OS random number generator
    #[inline]
    pub fn generate() -> Self {
        Self::new(SecretKey::generate())
    }

    /// Try to parse keys from a `hex` or `bech32` secret key
    #[inline]
    pub fn parse<S>(secret_key: S) -> Result<Self, Error>
    where
        S: AsRef<str>,
    {
        Ok(Self::new(SecretKey::parse(secret_key)?))
    }

    /// Get the public key
    #[inline]
    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// Get the secret key
    #[inline]
    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    fn key_pair(&self) -> &Keypair {
        self.key_pair
            .get_or_init(|| Keypair::from_secret_key(&SECP256K1, self.secret_key.as_secp()))
    }

    /// Sign a 32-byte digest with Schnorr
    pub fn sign_schnorr(&self, digest: [u8; 32]) -> Signature {
        let message: Message = Message::from_digest(digest);
        SECP256K1.sign_schnorr(&message, self.key_pair())
    }
}

impl FromStr for Keys {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[async_trait]
impl Signer for Keys {
    fn backend(&self) -> SignerBackend {
        SignerBackend::Keys
    }

    async fn get_public_key(&self) -> Result<PublicKey, SignerError> {
        Ok(self.public_key)
    }

    async fn sign_event(&self, unsigned: UnsignedEvent) -> Result<Event, SignerError> {
        unsigned.sign_with_keys(self).map_err(SignerError::backend)
    }

    async fn nip04_encrypt(
        &self,
        public_key: &PublicKey,
        content: &str,
    ) -> Result<String, SignerError> {
        crate::nips::nip04::encrypt(self.secret_key(), public_key, content)
            .map_err(SignerError::backend)
    }

    async fn nip04_decrypt(
        &self,
        public_key: &PublicKey,
        encrypted_content: &str,
    ) -> Result<String, SignerError> {
        crate::nips::nip04::decrypt(self.secret_key(), public_key, encrypted_content)
            .map_err(SignerError::backend)
    }

    async fn nip44_encrypt(
        &self,
        public_key: &PublicKey,
        content: &str,
    ) -> Result<String, SignerError> {
        crate::nips::nip44::encrypt(self.secret_key(), public_key, content)
            .map_err(SignerError::backend)
    }

    async fn nip44_decrypt(
        &self,
        public_key: &PublicKey,
        payload: &str,
    ) -> Result<String, SignerError> {
        crate::nips::nip44::decrypt(self.secret_key(), public_key, payload)
            .map_err(SignerError::backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_public_key() {
        let keys =
            Keys::parse("nsec1j5sw4vtgzzvmrjtqynvre0fknyfyysjpul0t2eew50rngdgltxnq0efsa0").unwrap();
        assert_eq!(
            keys.public_key().to_hex(),
            "f79a99714c761c0e0fea6777a70103d71d75fb7900b0894bfe6c64054807b573"
        );
    }

    #[test]
    fn test_keys_equality() {
        let keys =
            Keys::parse("6b911fd37cdf5c81d4c0adb1ab7fa822ed253ab0ad9aa18d77257c88b29b718e").unwrap();
        let same = Keys::new(keys.secret_key().clone());
        assert_eq!(keys, same);
    }
}
