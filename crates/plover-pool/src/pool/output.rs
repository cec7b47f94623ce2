// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Publish output

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Duration;

use plover::{EventId, RelayUrl};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Per-relay publish outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RelayPublishResult {
    /// The relay acknowledged the event
    Success,
    /// The relay rejected the event
    Failed(String),
    /// No acknowledgment within the per-relay timeout
    TimedOut,
}

/// Aggregated publish result with per-relay outcomes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutput {
    /// Event id
    pub event_id: EventId,
    /// Relays that acknowledged the event
    pub success: BTreeSet<RelayUrl>,
    /// Relays that rejected the event, with the rejection message
    pub failed: BTreeMap<RelayUrl, String>,
    /// Relays that did not conclude before the deadline
    pub timed_out: BTreeSet<RelayUrl>,
    min_success: usize,
}

impl PublishOutput {
    /// Check if at least `min_success` relays acknowledged the event
    #[inline]
    pub fn is_success(&self) -> bool {
        self.success.len() >= self.min_success
    }
}

/// Collect per-relay outcomes until every target concluded or the deadline
/// expires. Targets that never concluded are reported as timed out.
pub(crate) async fn collect_publish_results(
    event_id: EventId,
    targets: HashSet<RelayUrl>,
    mut rx: mpsc::Receiver<(RelayUrl, RelayPublishResult)>,
    min_success: usize,
    deadline: Duration,
) -> PublishOutput {
    let mut output = PublishOutput {
        event_id,
        success: BTreeSet::new(),
        failed: BTreeMap::new(),
        timed_out: BTreeSet::new(),
        min_success,
    };

    let mut pending: HashSet<RelayUrl> = targets;
    let deadline: Instant = Instant::now() + deadline;

    while !pending.is_empty() {
        let result = tokio::select! {
            result = rx.recv() => result,
            _ = tokio::time::sleep_until(deadline) => None,
        };

        match result {
            Some((url, result)) => {
                if !pending.remove(&url) {
                    // First conclusion wins per relay
                    continue;
                }
                match result {
                    RelayPublishResult::Success => {
                        output.success.insert(url);
                    }
                    RelayPublishResult::Failed(message) => {
                        output.failed.insert(url, message);
                    }
                    RelayPublishResult::TimedOut => {
                        output.timed_out.insert(url);
                    }
                }
            }
            // Deadline expired or all senders gone
            None => break,
        }
    }

    // Whatever never concluded is timed out
    output.timed_out.extend(pending);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> RelayUrl {
        RelayUrl::parse(s).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_aggregation_with_mixed_outcomes() {
        let r1 = url("wss://one.example.com");
        let r2 = url("wss://two.example.com");
        let r3 = url("wss://three.example.com");
        let targets: HashSet<RelayUrl> = [r1.clone(), r2.clone(), r3.clone()].into();

        let (tx, rx) = mpsc::channel(8);
        tx.send((r1.clone(), RelayPublishResult::Success))
            .await
            .unwrap();
        tx.send((
            r2.clone(),
            RelayPublishResult::Failed(String::from("rate-limited: try later")),
        ))
        .await
        .unwrap();
        // r3 never concludes

        let output = collect_publish_results(
            EventId::all_zeros(),
            targets,
            rx,
            1,
            Duration::from_secs(12),
        )
        .await;

        assert!(output.is_success());
        assert_eq!(output.success.iter().collect::<Vec<_>>(), vec![&r1]);
        assert_eq!(
            output.failed.get(&r2).map(|s| s.as_str()),
            Some("rate-limited: try later")
        );
        assert_eq!(output.timed_out.iter().collect::<Vec<_>>(), vec![&r3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_success_not_met() {
        let r1 = url("wss://one.example.com");
        let targets: HashSet<RelayUrl> = [r1.clone()].into();

        let (tx, rx) = mpsc::channel(8);
        tx.send((
            r1.clone(),
            RelayPublishResult::Failed(String::from("blocked: nope")),
        ))
        .await
        .unwrap();

        let output = collect_publish_results(
            EventId::all_zeros(),
            targets,
            rx,
            1,
            Duration::from_secs(12),
        )
        .await;

        assert!(!output.is_success());
        assert!(output.success.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_concluded_returns_before_deadline() {
        let r1 = url("wss://one.example.com");
        let targets: HashSet<RelayUrl> = [r1.clone()].into();

        let (tx, rx) = mpsc::channel(8);
        tx.send((r1.clone(), RelayPublishResult::Success))
            .await
            .unwrap();

        let started = Instant::now();
        let output = collect_publish_results(
            EventId::all_zeros(),
            targets,
            rx,
            1,
            Duration::from_secs(3600),
        )
        .await;

        assert!(output.is_success());
        // No waiting for the full deadline once every relay concluded
        assert!(started.elapsed() < Duration::from_secs(3600));
    }
}
