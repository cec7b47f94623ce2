// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay status

use core::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Relay connection status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RelayStatus {
    /// Not connected, no connection task running
    #[default]
    Disconnected,
    /// Connection attempt in flight
    Connecting,
    /// Connected
    Connected,
    /// Graceful disconnect in progress
    Disconnecting,
    /// Transport failure; the backoff loop decides the next attempt
    Failed,
}

impl fmt::Display for RelayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

impl RelayStatus {
    /// Check if connected
    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if a new connection attempt is allowed
    #[inline]
    pub(crate) fn can_connect(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed)
    }
}

/// Atomic cell for [`RelayStatus`]
#[derive(Debug, Default)]
pub(crate) struct AtomicRelayStatus {
    value: AtomicU8,
}

impl AtomicRelayStatus {
    pub(crate) fn set(&self, status: RelayStatus) {
        self.value.store(status as u8, Ordering::SeqCst);
    }

    pub(crate) fn load(&self) -> RelayStatus {
        match self.value.load(Ordering::SeqCst) {
            0 => RelayStatus::Disconnected,
            1 => RelayStatus::Connecting,
            2 => RelayStatus::Connected,
            3 => RelayStatus::Disconnecting,
            _ => RelayStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_roundtrip() {
        let status = AtomicRelayStatus::default();
        assert_eq!(status.load(), RelayStatus::Disconnected);

        for s in [
            RelayStatus::Connecting,
            RelayStatus::Connected,
            RelayStatus::Disconnecting,
            RelayStatus::Failed,
            RelayStatus::Disconnected,
        ] {
            status.set(s);
            assert_eq!(status.load(), s);
        }
    }

    #[test]
    fn test_can_connect() {
        assert!(RelayStatus::Disconnected.can_connect());
        assert!(RelayStatus::Failed.can_connect());
        assert!(!RelayStatus::Connected.can_connect());
        assert!(!RelayStatus::Connecting.can_connect());
        assert!(!RelayStatus::Disconnecting.can_connect());
    }
}
