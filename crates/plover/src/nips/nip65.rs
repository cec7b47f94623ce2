// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! NIP65: Relay List Metadata
//!
//! <https://github.com/nostr-protocol/nips/blob/master/65.md>

use core::fmt;
use core::str::FromStr;

use crate::types::url::RelayUrl;
use crate::Event;

/// NIP65 error
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// Invalid relay metadata marker
    InvalidRelayMetadata(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRelayMetadata(s) => write!(f, "Invalid relay metadata: {s}"),
        }
    }
}

/// Relay usage marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RelayMetadata {
    /// Read
    Read,
    /// Write
    Write,
}

impl fmt::Display for RelayMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

impl FromStr for RelayMetadata {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            s => Err(Error::InvalidRelayMetadata(s.to_string())),
        }
    }
}

/// Extract the relay list from a kind 10002 event.
///
/// An unmarked `r` tag means both read and write (`None`). Unparsable entries
/// are skipped.
pub fn extract_relay_list(event: &Event) -> Vec<(RelayUrl, Option<RelayMetadata>)> {
    event
        .tags
        .iter()
        .filter(|tag| tag.name() == "r")
        .filter_map(|tag| {
            let url: RelayUrl = RelayUrl::parse(tag.content()?).ok()?;
            match tag.as_slice().get(2) {
                Some(marker) => Some((url, Some(RelayMetadata::from_str(marker).ok()?))),
                None => Some((url, None)),
            }
        })
        .collect()
}
