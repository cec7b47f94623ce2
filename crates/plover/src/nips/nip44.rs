// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! NIP44 (v2): Versioned encrypted payloads
//!
//! <https://github.com/nostr-protocol/nips/blob/master/44.md>

use core::fmt;
use core::iter;
use core::ops::Range;

use base64::engine::{general_purpose, Engine};
use bitcoin_hashes::hmac::{Hmac, HmacEngine};
use bitcoin_hashes::sha256::Hash as Sha256Hash;
use bitcoin_hashes::{Hash, HashEngine};
use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use secp256k1::rand::rngs::OsRng;
use secp256k1::rand::RngCore;

use crate::key::{PublicKey, SecretKey};
use crate::util::{self, hkdf};

const MESSAGE_KEYS_SIZE: usize = 76;
const ENCRYPTION_RANGE: Range<usize> = 0..32;
const NONCE_RANGE: Range<usize> = 32..44;
const AUTH_RANGE: Range<usize> = 44..76;

const MAX_PLAINTEXT_SIZE: usize = 65535;

/// NIP44 error
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// Error while decoding from base64
    Base64Decode,
    /// Error while encoding to UTF-8
    Utf8Encode,
    /// Unknown version
    UnknownVersion(u8),
    /// Payload too short
    InvalidPayloadLength(usize),
    /// Message is empty
    MessageEmpty,
    /// Message is too long
    MessageTooLong,
    /// Invalid HMAC
    InvalidHmac,
    /// Invalid padding
    InvalidPadding,
    /// Secp256k1 error
    Secp256k1(secp256k1::Error),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base64Decode => write!(f, "Error while decoding from base64"),
            Self::Utf8Encode => write!(f, "Error while encoding to UTF-8"),
            Self::UnknownVersion(v) => write!(f, "Unknown version: {v}"),
            Self::InvalidPayloadLength(len) => write!(f, "Invalid payload length: {len}"),
            Self::MessageEmpty => write!(f, "Message empty"),
            Self::MessageTooLong => write!(f, "Message too long"),
            Self::InvalidHmac => write!(f, "Invalid HMAC"),
            Self::InvalidPadding => write!(f, "Invalid padding"),
            Self::Secp256k1(e) => write!(f, "Secp256k1: {e}"),
        }
    }
}

impl From<secp256k1::Error> for Error {
    fn from(e: secp256k1::Error) -> Self {
        Self::Secp256k1(e)
    }
}

/// NIP44 conversation key: shared between the two parties, constant across
/// messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationKey([u8; 32]);

impl ConversationKey {
    /// Derive the conversation key from a key pair
    pub fn derive(secret_key: &SecretKey, public_key: &PublicKey) -> Result<Self, Error> {
        let shared_key: [u8; 32] = util::generate_shared_key(secret_key, public_key)?;
        Ok(Self(hkdf::extract(b"nip44-v2", &shared_key)))
    }

    /// Construct from bytes
    #[inline]
    pub const fn from_byte_array(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get as bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

struct MessageKeys([u8; MESSAGE_KEYS_SIZE]);

impl MessageKeys {
    fn derive(conversation_key: &ConversationKey, nonce: &[u8; 32]) -> Self {
        let expanded: Vec<u8> = hkdf::expand(conversation_key.as_bytes(), nonce, MESSAGE_KEYS_SIZE);
        let mut keys: [u8; MESSAGE_KEYS_SIZE] = [0u8; MESSAGE_KEYS_SIZE];
        keys.copy_from_slice(&expanded);
        Self(keys)
    }

    #[inline]
    fn encryption(&self) -> &[u8] {
        &self.0[ENCRYPTION_RANGE]
    }

    #[inline]
    fn nonce(&self) -> &[u8] {
        &self.0[NONCE_RANGE]
    }

    #[inline]
    fn auth(&self) -> &[u8] {
        &self.0[AUTH_RANGE]
    }
}

/// Encrypt with NIP44 (v2)
pub fn encrypt<T>(
    secret_key: &SecretKey,
    public_key: &PublicKey,
    content: T,
) -> Result<String, Error>
where
    T: AsRef<[u8]>,
{
    encrypt_with_rng(&mut OsRng, secret_key, public_key, content)
}

/// Encrypt with NIP44 (v2) using a custom RNG
pub fn encrypt_with_rng<R, T>(
    rng: &mut R,
    secret_key: &SecretKey,
    public_key: &PublicKey,
    content: T,
) -> Result<String, Error>
where
    R: RngCore,
    T: AsRef<[u8]>,
{
    let conversation_key: ConversationKey = ConversationKey::derive(secret_key, public_key)?;

    let mut nonce: [u8; 32] = [0u8; 32];
    rng.fill_bytes(&mut nonce);

    encrypt_with_conversation_key(&conversation_key, &nonce, content)
}

/// Encrypt with an already derived [`ConversationKey`] and explicit nonce
pub fn encrypt_with_conversation_key<T>(
    conversation_key: &ConversationKey,
    nonce: &[u8; 32],
    content: T,
) -> Result<String, Error>
where
    T: AsRef<[u8]>,
{
    let keys: MessageKeys = MessageKeys::derive(conversation_key, nonce);

    let mut buffer: Vec<u8> = pad(content.as_ref())?;
    let mut cipher = ChaCha20::new(keys.encryption().into(), keys.nonce().into());
    cipher.apply_keystream(&mut buffer);

    let mac: [u8; 32] = hmac_aad(keys.auth(), nonce, &buffer);

    let mut payload: Vec<u8> = vec![2]; // Version
    payload.extend_from_slice(nonce);
    payload.extend_from_slice(&buffer);
    payload.extend_from_slice(&mac);

    Ok(general_purpose::STANDARD.encode(payload))
}

/// Decrypt a NIP44 payload
pub fn decrypt<S>(
    secret_key: &SecretKey,
    public_key: &PublicKey,
    payload: S,
) -> Result<String, Error>
where
    S: AsRef<str>,
{
    let conversation_key: ConversationKey = ConversationKey::derive(secret_key, public_key)?;
    decrypt_with_conversation_key(&conversation_key, payload)
}

/// Decrypt with an already derived [`ConversationKey`]
pub fn decrypt_with_conversation_key<S>(
    conversation_key: &ConversationKey,
    payload: S,
) -> Result<String, Error>
where
    S: AsRef<str>,
{
    let payload: Vec<u8> = general_purpose::STANDARD
        .decode(payload.as_ref())
        .map_err(|_| Error::Base64Decode)?;
    let len: usize = payload.len();

    // version (1) + nonce (32) + padded len prefix (2) + chunk (32) + mac (32)
    if len < 99 {
        return Err(Error::InvalidPayloadLength(len));
    }

    let version: u8 = payload[0];
    if version != 2 {
        return Err(Error::UnknownVersion(version));
    }

    let nonce: [u8; 32] = payload[1..33]
        .try_into()
        .map_err(|_| Error::InvalidPayloadLength(len))?;
    let buffer: &[u8] = &payload[33..len - 32];
    let mac: &[u8] = &payload[len - 32..];

    let keys: MessageKeys = MessageKeys::derive(conversation_key, &nonce);

    let calculated_mac: [u8; 32] = hmac_aad(keys.auth(), &nonce, buffer);
    if mac != calculated_mac.as_slice() {
        return Err(Error::InvalidHmac);
    }

    let mut buffer: Vec<u8> = buffer.to_vec();
    let mut cipher = ChaCha20::new(keys.encryption().into(), keys.nonce().into());
    cipher.apply_keystream(&mut buffer);

    let unpadded_len: usize =
        u16::from_be_bytes([buffer[0], buffer[1]]) as usize;
    if unpadded_len == 0 {
        return Err(Error::MessageEmpty);
    }
    let unpadded: &[u8] = buffer
        .get(2..2 + unpadded_len)
        .ok_or(Error::InvalidPadding)?;

    if buffer.len() != 2 + calc_padding(unpadded_len) {
        return Err(Error::InvalidPadding);
    }

    String::from_utf8(unpadded.to_vec()).map_err(|_| Error::Utf8Encode)
}

fn hmac_aad(auth_key: &[u8], aad: &[u8], message: &[u8]) -> [u8; 32] {
    let mut engine: HmacEngine<Sha256Hash> = HmacEngine::new(auth_key);
    engine.input(aad);
    engine.input(message);
    Hmac::from_engine(engine).to_byte_array()
}

fn pad(unpadded: &[u8]) -> Result<Vec<u8>, Error> {
    let len: usize = unpadded.len();

    if len == 0 {
        return Err(Error::MessageEmpty);
    }

    if len > MAX_PLAINTEXT_SIZE {
        return Err(Error::MessageTooLong);
    }

    let take: usize = calc_padding(len) - len;
    let mut padded: Vec<u8> = Vec::with_capacity(2 + len + take);
    padded.extend_from_slice(&(len as u16).to_be_bytes());
    padded.extend_from_slice(unpadded);
    padded.extend(iter::repeat(0).take(take));
    Ok(padded)
}

fn calc_padding(len: usize) -> usize {
    if len <= 32 {
        return 32;
    }
    let next_power: usize = 1 << (usize::BITS - (len - 1).leading_zeros());
    let chunk: usize = if next_power <= 256 { 32 } else { next_power / 8 };
    chunk * (((len - 1) / chunk) + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Keys;

    #[test]
    fn test_calc_padding() {
        assert_eq!(calc_padding(1), 32);
        assert_eq!(calc_padding(32), 32);
        assert_eq!(calc_padding(33), 64);
        assert_eq!(calc_padding(37), 64);
        assert_eq!(calc_padding(256), 256);
        assert_eq!(calc_padding(257), 320);
        assert_eq!(calc_padding(320), 320);
        assert_eq!(calc_padding(321), 384);
    }

    #[test]
    fn test_official_vector() {
        let secret_key = SecretKey::from_hex(
            "0000000000000000000000000000000000000000000000000000000000000001",
        )
        .unwrap();
        let public_key = PublicKey::from_hex(
            "c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5",
        )
        .unwrap();

        let conversation_key = ConversationKey::derive(&secret_key, &public_key).unwrap();
        assert_eq!(
            hex::encode(conversation_key.as_bytes()),
            "c41c775356fd92eadc63ff5a0dc1da211b268cbea22316767095b2871ea1412d"
        );

        let mut nonce: [u8; 32] = [0u8; 32];
        nonce[31] = 0x01;
        let payload = encrypt_with_conversation_key(&conversation_key, &nonce, "a").unwrap();
        assert_eq!(
            payload,
            "AgAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAABee0G5VSK0/9YypIObAtDKfYEAjD35uVkHyB0F4DwrcNaCXlCWZKaArsGrY6M9wnuTMxWfp1RTN9Xga8no+kF5Vsb"
        );
        assert_eq!(
            decrypt_with_conversation_key(&conversation_key, &payload).unwrap(),
            "a"
        );
    }

    #[test]
    fn test_conversation_key_symmetry() {
        let alice = Keys::generate();
        let bob = Keys::generate();

        let k1 = ConversationKey::derive(alice.secret_key(), &bob.public_key()).unwrap();
        let k2 = ConversationKey::derive(bob.secret_key(), &alice.public_key()).unwrap();
        assert_eq!(k1, k2);
    }

    #[test]
    fn test_encrypt_decrypt() {
        let alice = Keys::generate();
        let bob = Keys::generate();

        let payload = encrypt(alice.secret_key(), &bob.public_key(), "hello nip44").unwrap();
        let plaintext = decrypt(bob.secret_key(), &alice.public_key(), &payload).unwrap();
        assert_eq!(plaintext, "hello nip44");
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let alice = Keys::generate();
        let bob = Keys::generate();

        let payload = encrypt(alice.secret_key(), &bob.public_key(), "hello").unwrap();
        let mut raw = general_purpose::STANDARD.decode(&payload).unwrap();
        raw[40] ^= 0x01;
        let tampered = general_purpose::STANDARD.encode(raw);

        assert_eq!(
            decrypt(bob.secret_key(), &alice.public_key(), &tampered),
            Err(Error::InvalidHmac)
        );
    }

    #[test]
    fn test_empty_message_rejected() {
        let alice = Keys::generate();
        let bob = Keys::generate();
        assert_eq!(
            encrypt(alice.secret_key(), &bob.public_key(), ""),
            Err(Error::MessageEmpty)
        );
    }

    #[test]
    fn test_unknown_version() {
        let alice = Keys::generate();
        let bob = Keys::generate();
        let bogus = general_purpose::STANDARD.encode([1u8; 100]);
        assert_eq!(
            decrypt(alice.secret_key(), &bob.public_key(), bogus),
            Err(Error::UnknownVersion(1))
        );
    }
}
