// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Cache error

use thiserror::Error;

/// Cache error
#[derive(Debug, Error)]
pub enum CacheError {
    /// IO error
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Json error
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Store not available
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    /// Unsupported cache format version
    #[error("unsupported cache format version: {0}")]
    UnsupportedVersion(u32),
    /// Generic backend error
    #[error("{0}")]
    Backend(String),
}

impl CacheError {
    /// Wrap a backend error
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error,
    {
        Self::Backend(error.to_string())
    }
}
