// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay ranking

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use plover::RelayUrl;

/// Observed metrics of a relay, fed by the pool stats
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RelayMetrics {
    /// Connection success rate in `0.0..=1.0`
    pub success_rate: f64,
    /// Average latency
    pub latency: Option<Duration>,
    /// Number of tracked users advertising the relay
    pub matching_users: usize,
}

/// Scoring weights
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankerWeights {
    /// Weight of the recent success rate
    pub success_rate: f64,
    /// Weight of the latency score
    pub latency: f64,
    /// Weight of the matching-users score
    pub matching_users: f64,
}

impl Default for RankerWeights {
    fn default() -> Self {
        Self {
            success_rate: 0.5,
            latency: 0.3,
            matching_users: 0.2,
        }
    }
}

/// Scores relays by a weighted combination of success rate, latency and
/// matching users. Blacklisted relays always score zero.
#[derive(Debug, Clone, Default)]
pub struct RelayRanker {
    weights: RankerWeights,
}

impl RelayRanker {
    /// New ranker
    pub fn new(weights: RankerWeights) -> Self {
        Self { weights }
    }

    /// Score a single relay
    pub fn score(
        &self,
        url: &RelayUrl,
        metrics: &HashMap<RelayUrl, RelayMetrics>,
        blacklist: &HashSet<RelayUrl>,
    ) -> f64 {
        if blacklist.contains(url) {
            return 0.0;
        }

        let metrics: RelayMetrics = metrics.get(url).copied().unwrap_or(RelayMetrics {
            // Unknown relays get a neutral score so that new relays still
            // get a chance to be selected
            success_rate: 0.5,
            latency: None,
            matching_users: 0,
        });

        let latency_score: f64 = match metrics.latency {
            // 0 ms -> 1.0, 1000 ms -> ~0.09
            Some(latency) => 1.0 / (1.0 + latency.as_millis() as f64 / 100.0),
            None => 0.5,
        };
        let users_score: f64 = 1.0 - 1.0 / (1.0 + metrics.matching_users as f64);

        self.weights.success_rate * metrics.success_rate.clamp(0.0, 1.0)
            + self.weights.latency * latency_score
            + self.weights.matching_users * users_score
    }

    /// Rank candidates best-first and keep the top `k`.
    ///
    /// Always returns at least one relay when a non-blacklisted candidate is
    /// available, even with `k == 0`.
    pub fn top_k(
        &self,
        candidates: HashSet<RelayUrl>,
        metrics: &HashMap<RelayUrl, RelayMetrics>,
        blacklist: &HashSet<RelayUrl>,
        k: usize,
    ) -> Vec<RelayUrl> {
        let mut scored: Vec<(RelayUrl, f64)> = candidates
            .into_iter()
            .filter(|url| !blacklist.contains(url))
            .map(|url| {
                let score: f64 = self.score(&url, metrics, blacklist);
                (url, score)
            })
            .collect();

        scored.sort_by(|(url_a, a), (url_b, b)| {
            b.partial_cmp(a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| url_a.cmp(url_b))
        });

        scored
            .into_iter()
            .map(|(url, _)| url)
            .take(k.max(1))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay(s: &str) -> RelayUrl {
        RelayUrl::parse(s).unwrap()
    }

    #[test]
    fn test_blacklisted_scores_zero() {
        let ranker = RelayRanker::default();
        let url = relay("wss://spam.example.com");
        let blacklist: HashSet<RelayUrl> = [url.clone()].into();
        assert_eq!(ranker.score(&url, &HashMap::new(), &blacklist), 0.0);
    }

    #[test]
    fn test_better_metrics_rank_higher() {
        let ranker = RelayRanker::default();
        let good = relay("wss://good.example.com");
        let bad = relay("wss://bad.example.com");

        let mut metrics: HashMap<RelayUrl, RelayMetrics> = HashMap::new();
        metrics.insert(
            good.clone(),
            RelayMetrics {
                success_rate: 1.0,
                latency: Some(Duration::from_millis(50)),
                matching_users: 10,
            },
        );
        metrics.insert(
            bad.clone(),
            RelayMetrics {
                success_rate: 0.2,
                latency: Some(Duration::from_millis(900)),
                matching_users: 0,
            },
        );

        let ranked = ranker.top_k(
            [good.clone(), bad.clone()].into(),
            &metrics,
            &HashSet::new(),
            2,
        );
        assert_eq!(ranked, vec![good, bad]);
    }

    #[test]
    fn test_top_k_caps_but_keeps_one() {
        let ranker = RelayRanker::default();
        let candidates: HashSet<RelayUrl> = (0..10)
            .map(|i| relay(&format!("wss://relay-{i}.example.com")))
            .collect();

        assert_eq!(
            ranker
                .top_k(candidates.clone(), &HashMap::new(), &HashSet::new(), 3)
                .len(),
            3
        );
        // At least one relay survives even with k == 0
        assert_eq!(
            ranker
                .top_k(candidates, &HashMap::new(), &HashSet::new(), 0)
                .len(),
            1
        );
    }

    #[test]
    fn test_blacklist_filtered_from_ranking() {
        let ranker = RelayRanker::default();
        let kept = relay("wss://kept.example.com");
        let banned = relay("wss://banned.example.com");
        let blacklist: HashSet<RelayUrl> = [banned.clone()].into();

        let ranked = ranker.top_k(
            [kept.clone(), banned].into(),
            &HashMap::new(),
            &blacklist,
            5,
        );
        assert_eq!(ranked, vec![kept]);
    }
}
