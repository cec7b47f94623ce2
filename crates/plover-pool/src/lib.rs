// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay pool: connection state machines, a central subscription manager and
//! the publish pipeline.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]
#![warn(clippy::large_futures)]

pub mod manager;
pub mod pool;
pub mod prelude;
pub mod relay;

pub use self::manager::{
    AwaitEoseError, CacheUsage, ManagerOptions, SubscriptionError, SubscriptionHandle,
    SubscriptionManager, SubscriptionOptions, SubscriptionState, SubscriptionUpdate,
};
pub use self::pool::{PoolNotification, PoolOptions, PublishOptions, PublishOutput, RelayPool};
pub use self::relay::{
    Relay, RelayConnectionStats, RelayLimits, RelayNotification, RelayOptions, RelayStatus,
    SamplerOptions,
};
