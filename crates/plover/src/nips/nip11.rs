// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! NIP11: Relay Information Document
//!
//! <https://github.com/nostr-protocol/nips/blob/master/11.md>

use core::fmt;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::types::url::RelayUrl;

/// NIP11 error
#[derive(Debug)]
pub enum Error {
    /// The relay information document is invalid
    InvalidInformationDocument,
    /// Reqwest error
    Reqwest(reqwest::Error),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInformationDocument => {
                write!(f, "The relay information document is invalid")
            }
            Self::Reqwest(e) => write!(f, "{e}"),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Reqwest(e)
    }
}

/// Limitations imposed by the relay on clients
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limitation {
    /// Maximum number of bytes for incoming JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_message_length: Option<u32>,
    /// Total number of subscriptions that may be active on a single connection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_subscriptions: Option<u16>,
    /// Maximum number of filter values in each subscription
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_filters: Option<u16>,
    /// Maximum returnable events per subscription
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_limit: Option<u32>,
    /// Maximum length of subscription id as a string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_subid_length: Option<u16>,
    /// Events must have a difficulty of at least this
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_pow_difficulty: Option<u8>,
    /// Relay requires NIP42 authentication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_required: Option<bool>,
    /// Relay requires payment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_required: Option<bool>,
}

/// Relay information document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayInformationDocument {
    /// Name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Owner public key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<String>,
    /// Owner contact
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    /// Supported NIPs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supported_nips: Option<Vec<u16>>,
    /// Software
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software: Option<String>,
    /// Software version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Limitations imposed by the relay on clients
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limitation: Option<Limitation>,
    /// URL pointing to an image to be used as an icon for the relay
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl RelayInformationDocument {
    /// New empty document
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the information document of a relay over HTTPS.
    ///
    /// Best-effort, out-of-band: callers must treat a failure as non-fatal.
    pub async fn get(url: &RelayUrl) -> Result<Self, Error> {
        let client: Client = Client::new();
        let response = client
            .get(url.to_http_url())
            .header("Accept", "application/nostr+json")
            .send()
            .await?;
        response
            .json()
            .await
            .map_err(|_| Error::InvalidInformationDocument)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize() {
        let json = r#"{
            "name": "nostr.example",
            "description": "a relay",
            "supported_nips": [1, 11, 42],
            "limitation": {"max_message_length": 65536, "max_filters": 10, "max_subid_length": 64, "auth_required": false}
        }"#;
        let document: RelayInformationDocument = serde_json::from_str(json).unwrap();
        assert_eq!(document.name, Some(String::from("nostr.example")));
        assert_eq!(document.supported_nips, Some(vec![1, 11, 42]));
        let limitation = document.limitation.unwrap();
        assert_eq!(limitation.max_filters, Some(10));
        assert_eq!(limitation.max_subid_length, Some(64));
        assert_eq!(limitation.auth_required, Some(false));
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let json = r#"{"name": "x", "retention": [{"kinds": [0]}], "fees": {}}"#;
        let document: RelayInformationDocument = serde_json::from_str(json).unwrap();
        assert_eq!(document.name, Some(String::from("x")));
    }
}
