// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Reconnection backoff

use std::time::Duration;

/// Exponential backoff: doubles on every failure, capped, reset on success.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    base: Duration,
    cap: Duration,
    current: Duration,
}

impl Backoff {
    pub(crate) fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            current: base,
        }
    }

    /// Delay to wait before the next attempt; doubles the internal state
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay: Duration = self.current;
        self.current = (self.current * 2).min(self.cap);
        delay
    }

    /// Reset to the base delay after a successful open
    pub(crate) fn reset(&mut self) {
        self.current = self.base;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_and_reset() {
        let mut backoff = Backoff::default();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));

        // A successful open resets to the base
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(300));
        let mut last = Duration::ZERO;
        for _ in 0..20 {
            let delay = backoff.next_delay();
            // Monotonically non-decreasing, never above the cap
            assert!(delay >= last);
            assert!(delay <= Duration::from_secs(300));
            last = delay;
        }
        assert_eq!(last, Duration::from_secs(300));
    }
}
