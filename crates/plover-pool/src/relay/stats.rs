// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay connection stats

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use plover::Timestamp;

const LATENCY_MAX_VALUES: usize = 50;

#[derive(Debug, Default)]
struct InnerRelayConnectionStats {
    attempts: AtomicUsize,
    success: AtomicUsize,
    bytes_sent: AtomicUsize,
    bytes_received: AtomicUsize,
    messages_sent: AtomicUsize,
    messages_received: AtomicUsize,
    parse_errors: AtomicUsize,
    signatures_verified: AtomicUsize,
    signatures_invalid: AtomicUsize,
    connected_at: AtomicU64,
    first_connection_at: AtomicU64,
    latencies: Mutex<VecDeque<Duration>>,
}

/// Relay connection stats
#[derive(Debug, Clone, Default)]
pub struct RelayConnectionStats {
    inner: Arc<InnerRelayConnectionStats>,
}

impl RelayConnectionStats {
    /// The number of times a connection has been attempted
    #[inline]
    pub fn attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// The number of times a connection has been successfully established
    #[inline]
    pub fn success(&self) -> usize {
        self.inner.success.load(Ordering::SeqCst)
    }

    /// Success rate
    pub fn success_rate(&self) -> f64 {
        let attempts: usize = self.attempts();
        if attempts > 0 {
            self.success() as f64 / attempts as f64
        } else {
            0.0
        }
    }

    /// Bytes sent
    #[inline]
    pub fn bytes_sent(&self) -> usize {
        self.inner.bytes_sent.load(Ordering::SeqCst)
    }

    /// Bytes received
    #[inline]
    pub fn bytes_received(&self) -> usize {
        self.inner.bytes_received.load(Ordering::SeqCst)
    }

    /// Messages sent
    #[inline]
    pub fn messages_sent(&self) -> usize {
        self.inner.messages_sent.load(Ordering::SeqCst)
    }

    /// Messages received
    #[inline]
    pub fn messages_received(&self) -> usize {
        self.inner.messages_received.load(Ordering::SeqCst)
    }

    /// Messages that failed to parse
    #[inline]
    pub fn parse_errors(&self) -> usize {
        self.inner.parse_errors.load(Ordering::SeqCst)
    }

    /// Signatures verified
    #[inline]
    pub fn signatures_verified(&self) -> usize {
        self.inner.signatures_verified.load(Ordering::SeqCst)
    }

    /// Invalid signatures seen
    #[inline]
    pub fn signatures_invalid(&self) -> usize {
        self.inner.signatures_invalid.load(Ordering::SeqCst)
    }

    /// UNIX timestamp of the last successful connection
    #[inline]
    pub fn connected_at(&self) -> Timestamp {
        Timestamp::from(self.inner.connected_at.load(Ordering::SeqCst))
    }

    /// UNIX timestamp of the first successful connection
    #[inline]
    pub fn first_connection_timestamp(&self) -> Timestamp {
        Timestamp::from(self.inner.first_connection_at.load(Ordering::SeqCst))
    }

    /// Average connection latency over the recent samples
    pub fn latency(&self) -> Option<Duration> {
        let latencies = self.inner.latencies.lock().expect("stats poisoned");
        if latencies.is_empty() {
            return None;
        }
        let sum: Duration = latencies.iter().sum();
        sum.checked_div(latencies.len() as u32)
    }

    pub(crate) fn new_attempt(&self) {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn new_success(&self) {
        self.inner.success.fetch_add(1, Ordering::SeqCst);

        let now: u64 = Timestamp::now().as_u64();
        self.inner.connected_at.store(now, Ordering::SeqCst);

        if self.first_connection_timestamp().is_zero() {
            self.inner.first_connection_at.store(now, Ordering::SeqCst);
        }
    }

    pub(crate) fn add_bytes_sent(&self, size: usize) {
        if size > 0 {
            self.inner.bytes_sent.fetch_add(size, Ordering::SeqCst);
            self.inner.messages_sent.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn add_bytes_received(&self, size: usize) {
        if size > 0 {
            self.inner.bytes_received.fetch_add(size, Ordering::SeqCst);
            self.inner.messages_received.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn new_parse_error(&self) {
        self.inner.parse_errors.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn new_signature_verified(&self) {
        self.inner.signatures_verified.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn new_signature_invalid(&self) {
        self.inner.signatures_invalid.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn save_latency(&self, latency: Duration) {
        let mut latencies = self.inner.latencies.lock().expect("stats poisoned");
        if latencies.len() >= LATENCY_MAX_VALUES {
            latencies.pop_back();
        }
        latencies.push_front(latency);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate() {
        let stats = RelayConnectionStats::default();
        assert_eq!(stats.success_rate(), 0.0);

        stats.new_attempt();
        stats.new_attempt();
        stats.new_success();
        assert_eq!(stats.attempts(), 2);
        assert_eq!(stats.success(), 1);
        assert_eq!(stats.success_rate(), 0.5);
    }

    #[test]
    fn test_latency_average() {
        let stats = RelayConnectionStats::default();
        assert_eq!(stats.latency(), None);

        stats.save_latency(Duration::from_millis(100));
        stats.save_latency(Duration::from_millis(300));
        assert_eq!(stats.latency(), Some(Duration::from_millis(200)));
    }
}
