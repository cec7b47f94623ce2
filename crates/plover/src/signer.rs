// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Signer abstraction

use core::fmt;
use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{Event, PublicKey, UnsignedEvent};

/// Signer error
#[derive(Debug)]
pub struct SignerError(Box<dyn std::error::Error + Send + Sync>);

impl fmt::Display for SignerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SignerError {}

impl SignerError {
    /// Wrap a backend error
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Box::new(error))
    }

    /// Construct from a message
    pub fn message<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Self(message.into().into())
    }
}

/// Signer backend
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SignerBackend<'a> {
    /// Local secret key
    Keys,
    /// Remote bunker (NIP46)
    Bunker,
    /// Custom
    Custom(Cow<'a, str>),
}

/// Signer abstraction.
///
/// All operations may suspend. Failures are fatal to the current request but
/// never to the signer's state.
#[async_trait]
pub trait Signer: fmt::Debug + Send + Sync {
    /// Signer backend
    fn backend(&self) -> SignerBackend;

    /// Get signer public key
    async fn get_public_key(&self) -> Result<PublicKey, SignerError>;

    /// Sign an unsigned event
    async fn sign_event(&self, unsigned: UnsignedEvent) -> Result<Event, SignerError>;

    /// NIP04 encrypt
    async fn nip04_encrypt(
        &self,
        public_key: &PublicKey,
        content: &str,
    ) -> Result<String, SignerError>;

    /// NIP04 decrypt
    async fn nip04_decrypt(
        &self,
        public_key: &PublicKey,
        encrypted_content: &str,
    ) -> Result<String, SignerError>;

    /// NIP44 encrypt
    async fn nip44_encrypt(
        &self,
        public_key: &PublicKey,
        content: &str,
    ) -> Result<String, SignerError>;

    /// NIP44 decrypt
    async fn nip44_decrypt(
        &self,
        public_key: &PublicKey,
        payload: &str,
    ) -> Result<String, SignerError>;
}

#[async_trait]
impl Signer for Arc<dyn Signer> {
    #[inline]
    fn backend(&self) -> SignerBackend {
        self.as_ref().backend()
    }

    #[inline]
    async fn get_public_key(&self) -> Result<PublicKey, SignerError> {
        self.as_ref().get_public_key().await
    }

    #[inline]
    async fn sign_event(&self, unsigned: UnsignedEvent) -> Result<Event, SignerError> {
        self.as_ref().sign_event(unsigned).await
    }

    #[inline]
    async fn nip04_encrypt(
        &self,
        public_key: &PublicKey,
        content: &str,
    ) -> Result<String, SignerError> {
        self.as_ref().nip04_encrypt(public_key, content).await
    }

    #[inline]
    async fn nip04_decrypt(
        &self,
        public_key: &PublicKey,
        encrypted_content: &str,
    ) -> Result<String, SignerError> {
        self.as_ref()
            .nip04_decrypt(public_key, encrypted_content)
            .await
    }

    #[inline]
    async fn nip44_encrypt(
        &self,
        public_key: &PublicKey,
        content: &str,
    ) -> Result<String, SignerError> {
        self.as_ref().nip44_encrypt(public_key, content).await
    }

    #[inline]
    async fn nip44_decrypt(
        &self,
        public_key: &PublicKey,
        payload: &str,
    ) -> Result<String, SignerError> {
        self.as_ref().nip44_decrypt(public_key, payload).await
    }
}

#[doc(hidden)]
pub trait IntoSigner {
    fn into_signer(self) -> Arc<dyn Signer>;
}

impl<T> IntoSigner for T
where
    T: Signer + 'static,
{
    fn into_signer(self) -> Arc<dyn Signer> {
        Arc::new(self)
    }
}
