// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! NIP05: DNS-based internet identifiers
//!
//! <https://github.com/nostr-protocol/nips/blob/master/05.md>

use core::fmt;

use reqwest::Client;
use serde_json::Value;

use crate::key::PublicKey;
use crate::types::url::RelayUrl;

/// NIP05 error
#[derive(Debug)]
pub enum Error {
    /// Invalid identifier format
    InvalidFormat,
    /// Identifier not found in the response
    NotFound,
    /// Impossible to verify
    ImpossibleToVerify,
    /// Reqwest error
    Reqwest(reqwest::Error),
    /// Error deserializing JSON data
    Json(serde_json::Error),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFormat => write!(f, "invalid format"),
            Self::NotFound => write!(f, "identifier not found"),
            Self::ImpossibleToVerify => write!(f, "impossible to verify"),
            Self::Reqwest(e) => write!(f, "{e}"),
            Self::Json(e) => write!(f, "impossible to deserialize NIP05 data: {e}"),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Reqwest(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// Resolved NIP05 profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nip05Profile {
    /// Public key
    pub public_key: PublicKey,
    /// Relay hints
    pub relays: Vec<RelayUrl>,
    /// NIP46 relays, for bunker discovery
    pub nip46: Vec<RelayUrl>,
}

fn compose_url(identifier: &str) -> Result<(String, &str), Error> {
    let mut split = identifier.split('@');
    if let (Some(name), Some(domain), None) = (split.next(), split.next(), split.next()) {
        if name.is_empty() || domain.is_empty() {
            return Err(Error::InvalidFormat);
        }
        let url: String = format!("https://{domain}/.well-known/nostr.json?name={name}");
        return Ok((url, name));
    }
    Err(Error::InvalidFormat)
}

fn relay_urls(json: &Value, key: &str, hex: &str) -> Vec<RelayUrl> {
    json.get(key)
        .and_then(|map| map.get(hex))
        .and_then(|urls| urls.as_array())
        .map(|urls| {
            urls.iter()
                .filter_map(|url| url.as_str())
                .filter_map(|url| RelayUrl::parse(url).ok())
                .collect()
        })
        .unwrap_or_default()
}

fn profile_from_json(json: &Value, name: &str) -> Result<Nip05Profile, Error> {
    let pubkey: &str = json
        .get("names")
        .and_then(|names| names.get(name))
        .and_then(|value| value.as_str())
        .ok_or(Error::NotFound)?;
    let public_key: PublicKey = PublicKey::from_hex(pubkey).map_err(|_| Error::NotFound)?;
    let hex: String = public_key.to_hex();

    Ok(Nip05Profile {
        public_key,
        relays: relay_urls(json, "relays", &hex),
        nip46: relay_urls(json, "nip46", &hex),
    })
}

/// Resolve a `name@domain` identifier via `.well-known/nostr.json`
pub async fn get_profile<S>(identifier: S) -> Result<Nip05Profile, Error>
where
    S: AsRef<str>,
{
    let (url, name) = compose_url(identifier.as_ref())?;

    let client: Client = Client::new();
    let json: Value = client.get(url).send().await?.json().await?;

    profile_from_json(&json, name)
}

/// Verify that an identifier belongs to the given public key
pub async fn verify<S>(public_key: &PublicKey, identifier: S) -> Result<(), Error>
where
    S: AsRef<str>,
{
    let profile: Nip05Profile = get_profile(identifier).await?;
    if &profile.public_key == public_key {
        Ok(())
    } else {
        Err(Error::ImpossibleToVerify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUBKEY: &str = "b0635d6a9851d3aed0cd6c495b282167acf761729078d975fc341b22650b07b9";

    #[test]
    fn test_compose_url() {
        let (url, name) = compose_url("_@fiatjaf.com").unwrap();
        assert_eq!(url, "https://fiatjaf.com/.well-known/nostr.json?name=_");
        assert_eq!(name, "_");

        assert!(compose_url("no-at-sign").is_err());
        assert!(compose_url("@domain.com").is_err());
        assert!(compose_url("a@b@c").is_err());
    }

    #[test]
    fn test_profile_from_json() {
        let json: Value = serde_json::from_str(&format!(
            r#"{{
                "names": {{"bob": "{PUBKEY}"}},
                "relays": {{"{PUBKEY}": ["wss://relay.example.com"]}},
                "nip46": {{"{PUBKEY}": ["wss://bunker.example.com"]}}
            }}"#
        ))
        .unwrap();

        let profile = profile_from_json(&json, "bob").unwrap();
        assert_eq!(profile.public_key.to_hex(), PUBKEY);
        assert_eq!(profile.relays[0].as_str(), "wss://relay.example.com/");
        assert_eq!(profile.nip46[0].as_str(), "wss://bunker.example.com/");
    }

    #[test]
    fn test_profile_not_found() {
        let json: Value =
            serde_json::from_str(&format!(r#"{{"names": {{"bob": "{PUBKEY}"}}}}"#)).unwrap();
        assert!(matches!(
            profile_from_json(&json, "alice"),
            Err(Error::NotFound)
        ));
    }
}
