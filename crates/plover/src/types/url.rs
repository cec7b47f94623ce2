// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay URL

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

/// Relay URL error
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// Url parse error
    Url(url::ParseError),
    /// Unsupported scheme
    UnsupportedScheme(String),
    /// Missing host
    MissingHost,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(e) => write!(f, "Url: {e}"),
            Self::UnsupportedScheme(scheme) => write!(f, "Unsupported scheme: {scheme}"),
            Self::MissingHost => write!(f, "Missing host"),
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Self::Url(e)
    }
}

/// Normalized relay URL
///
/// Normalization rules:
/// - scheme lowercased, must be `ws` or `wss`;
/// - host lowercased, leading `www.` stripped;
/// - default port removed;
/// - path canonicalized to exactly one trailing slash.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelayUrl {
    url: String,
}

impl RelayUrl {
    /// Parse and normalize a relay URL
    pub fn parse<S>(url: S) -> Result<Self, Error>
    where
        S: AsRef<str>,
    {
        let url: Url = Url::parse(url.as_ref())?;

        // The `url` crate already lowercases scheme and host
        let scheme: &str = url.scheme();
        if scheme != "ws" && scheme != "wss" {
            return Err(Error::UnsupportedScheme(scheme.to_string()));
        }

        let host: &str = url.host_str().ok_or(Error::MissingHost)?;
        let host: &str = host.strip_prefix("www.").unwrap_or(host);

        // Default ports are already stripped by the parser
        let port: Option<u16> = url.port();

        // Exactly one trailing slash
        let path: &str = url.path().trim_end_matches('/');

        let mut normalized: String = format!("{scheme}://{host}");
        if let Some(port) = port {
            normalized.push(':');
            normalized.push_str(&port.to_string());
        }
        normalized.push_str(path);
        normalized.push('/');

        Ok(Self { url: normalized })
    }

    /// Get as `&str`
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// Convert into [`Url`] for transport use
    pub fn to_url(&self) -> Url {
        // The normalized string is a valid URL by construction
        Url::parse(&self.url).expect("normalized URL is valid")
    }

    /// Get the equivalent HTTP(S) URL, used for out-of-band document fetches
    pub fn to_http_url(&self) -> Url {
        let mut url: Url = self.to_url();
        let scheme: &str = match url.scheme() {
            "wss" => "https",
            _ => "http",
        };
        // Always valid: https/http are accepted schemes
        let _ = url.set_scheme(scheme);
        url
    }
}

impl FromStr for RelayUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RelayUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

impl Serialize for RelayUrl {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RelayUrl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let url: String = String::deserialize(deserializer)?;
        Self::parse(url).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        let url = RelayUrl::parse("WSS://Relay.Damus.io").unwrap();
        assert_eq!(url.as_str(), "wss://relay.damus.io/");

        let url = RelayUrl::parse("wss://www.example.com/").unwrap();
        assert_eq!(url.as_str(), "wss://example.com/");

        let url = RelayUrl::parse("wss://example.com:443/").unwrap();
        assert_eq!(url.as_str(), "wss://example.com/");

        let url = RelayUrl::parse("ws://example.com:8080/nostr///").unwrap();
        assert_eq!(url.as_str(), "ws://example.com:8080/nostr/");
    }

    #[test]
    fn test_equality_after_normalization() {
        let a = RelayUrl::parse("wss://relay.damus.io").unwrap();
        let b = RelayUrl::parse("wss://relay.damus.io/").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid() {
        assert!(RelayUrl::parse("https://example.com").is_err());
        assert!(RelayUrl::parse("not a url").is_err());
    }

    #[test]
    fn test_http_url() {
        let url = RelayUrl::parse("wss://relay.damus.io").unwrap();
        assert_eq!(url.to_http_url().as_str(), "https://relay.damus.io/");
    }
}
