// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay limits

/// Client-side limits applied per relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayLimits {
    /// Maximum size of an incoming message (default: 5 MiB)
    pub max_message_size: Option<u32>,
    /// Maximum size of an incoming event (default: 70 KiB)
    pub max_event_size: Option<u32>,
    /// Maximum filters per REQ (default: 10)
    pub max_filters: usize,
    /// Maximum subscription id length (default: 64)
    pub max_subid_length: usize,
}

impl Default for RelayLimits {
    fn default() -> Self {
        Self {
            max_message_size: Some(5 * 1024 * 1024),
            max_event_size: Some(70 * 1024),
            max_filters: 10,
            max_subid_length: 64,
        }
    }
}

impl RelayLimits {
    /// Disable all limits
    pub fn disabled() -> Self {
        Self {
            max_message_size: None,
            max_event_size: None,
            max_filters: usize::MAX,
            max_subid_length: usize::MAX,
        }
    }
}
