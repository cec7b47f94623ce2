// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Profile metadata (kind 0 content)

use serde::{Deserialize, Serialize};

use crate::JsonUtil;

/// Profile metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    /// Website url
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    /// Picture url
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    /// Banner url
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    /// NIP05 (ex. name@example.com)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nip05: Option<String>,
    /// LNURL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lud06: Option<String>,
    /// Lightning Address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lud16: Option<String>,
}

impl Metadata {
    /// New empty [`Metadata`]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set name
    pub fn name<S>(mut self, name: S) -> Self
    where
        S: Into<String>,
    {
        self.name = Some(name.into());
        self
    }

    /// Set display name
    pub fn display_name<S>(mut self, display_name: S) -> Self
    where
        S: Into<String>,
    {
        self.display_name = Some(display_name.into());
        self
    }

    /// Set about
    pub fn about<S>(mut self, about: S) -> Self
    where
        S: Into<String>,
    {
        self.about = Some(about.into());
        self
    }

    /// Set picture
    pub fn picture<S>(mut self, picture: S) -> Self
    where
        S: Into<String>,
    {
        self.picture = Some(picture.into());
        self
    }

    /// Set NIP05
    pub fn nip05<S>(mut self, nip05: S) -> Self
    where
        S: Into<String>,
    {
        self.nip05 = Some(nip05.into());
        self
    }
}

impl JsonUtil for Metadata {
    type Err = serde_json::Error;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_metadata() {
        let content = r#"{"name":"fiatjaf","about":"buy my merch at fiatjaf store","picture":"https://fiatjaf.com/static/favicon.jpg","nip05":"_@fiatjaf.com"}"#;
        let metadata = Metadata::from_json(content).unwrap();
        assert_eq!(metadata.name, Some(String::from("fiatjaf")));
        assert_eq!(metadata.nip05, Some(String::from("_@fiatjaf.com")));
        assert_eq!(metadata.display_name, None);
    }

    #[test]
    fn test_builder() {
        let metadata = Metadata::new().name("alice").about("hello");
        assert_eq!(metadata.name, Some(String::from("alice")));
        assert_eq!(metadata.about, Some(String::from("hello")));
    }
}
