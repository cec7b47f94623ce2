// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Event Kind

use core::fmt;
use core::str::FromStr;
use std::num::ParseIntError;

use serde::{Deserialize, Serialize};

/// Event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kind(u16);

impl Kind {
    /// Metadata (NIP01)
    pub const METADATA: Self = Self(0);
    /// Short text note (NIP01)
    pub const TEXT_NOTE: Self = Self(1);
    /// Contact list (NIP02)
    pub const CONTACT_LIST: Self = Self(3);
    /// Encrypted direct message (NIP04)
    pub const ENCRYPTED_DIRECT_MESSAGE: Self = Self(4);
    /// Event deletion (NIP09)
    pub const EVENT_DELETION: Self = Self(5);
    /// Relay list metadata (NIP65)
    pub const RELAY_LIST: Self = Self(10002);
    /// Client authentication (NIP42)
    pub const AUTHENTICATION: Self = Self(22242);
    /// Remote signing (NIP46)
    pub const NOSTR_CONNECT: Self = Self(24133);

    /// Construct from `u16`
    #[inline]
    pub const fn new(kind: u16) -> Self {
        Self(kind)
    }

    /// Get as `u16`
    #[inline]
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Check if the kind is replaceable: `0`, `3` or in range `10000..=19999`.
    ///
    /// Only the newest `(pubkey, kind)` tuple is authoritative.
    #[inline]
    pub fn is_replaceable(&self) -> bool {
        matches!(self.0, 0 | 3) || (10_000..20_000).contains(&self.0)
    }

    /// Check if the kind is ephemeral: range `20000..=29999`.
    ///
    /// Not stored by relays and never persisted locally.
    #[inline]
    pub fn is_ephemeral(&self) -> bool {
        (20_000..30_000).contains(&self.0)
    }

    /// Check if the kind is parameterized replaceable: range `30000..=39999`.
    ///
    /// The uniqueness key is `(pubkey, kind, d-tag)`.
    #[inline]
    pub fn is_addressable(&self) -> bool {
        (30_000..40_000).contains(&self.0)
    }

    /// Check if the kind is regular (accumulates by event id)
    #[inline]
    pub fn is_regular(&self) -> bool {
        !self.is_replaceable() && !self.is_ephemeral() && !self.is_addressable()
    }
}

impl From<u16> for Kind {
    fn from(kind: u16) -> Self {
        Self(kind)
    }
}

impl From<Kind> for u16 {
    fn from(kind: Kind) -> Self {
        kind.0
    }
}

impl FromStr for Kind {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
