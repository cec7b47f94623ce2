// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay error

use thiserror::Error;

/// Relay error
#[derive(Debug, Error)]
pub enum Error {
    /// Not connected
    #[error("relay not connected")]
    NotConnected,
    /// Outbound queue full
    #[error("outbound queue full")]
    QueueFull,
    /// Connection attempt failed
    #[error("connection failed: {0}")]
    ConnectFailed(String),
    /// Send failed
    #[error("send failed")]
    SendFailed,
    /// Relay rejected the message
    #[error("relay message: {0}")]
    RelayMessage(String),
    /// Authentication required but no credential handler configured
    #[error("authentication required")]
    AuthRequired,
    /// Unexpected event kind
    #[error("unexpected kind: expected {expected}, found {found}")]
    UnexpectedKind {
        /// Expected kind
        expected: plover::Kind,
        /// Found kind
        found: plover::Kind,
    },
    /// Operation timed out
    #[error("timeout")]
    Timeout,
    /// Relay is shutting down
    #[error("shutdown")]
    Shutdown,
}
