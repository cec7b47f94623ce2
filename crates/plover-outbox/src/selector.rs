// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay selection for reads and writes

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use plover::{PublicKey, RelayUrl};

use crate::ranker::{RelayMetrics, RelayRanker};
use crate::tracker::OutboxTracker;

/// Per-author cap when selecting write relays
pub const DEFAULT_WRITE_RELAYS_PER_AUTHOR: usize = 5;
/// Per-recipient cap when selecting read relays
pub const DEFAULT_READ_RELAYS_PER_USER: usize = 3;
/// Global cap of one selection
pub const DEFAULT_MAX_RELAYS_PER_SELECTION: usize = 10;

/// Selection output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Chosen relays
    pub relays: HashSet<RelayUrl>,
    /// Pubkeys with no tracked relay list; callers should fetch their kind
    /// 10002 and retry
    pub missing: Vec<PublicKey>,
}

/// Selector options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectorOptions {
    /// Write relays kept per author
    pub write_relays_per_author: usize,
    /// Read relays kept per recipient
    pub read_relays_per_user: usize,
    /// Hard cap of a whole selection
    pub max_relays_per_selection: usize,
}

impl Default for SelectorOptions {
    fn default() -> Self {
        Self {
            write_relays_per_author: DEFAULT_WRITE_RELAYS_PER_AUTHOR,
            read_relays_per_user: DEFAULT_READ_RELAYS_PER_USER,
            max_relays_per_selection: DEFAULT_MAX_RELAYS_PER_SELECTION,
        }
    }
}

/// Produces relay sets for publishing and fetching based on the tracked
/// relay lists, ranked and capped.
#[derive(Debug)]
pub struct RelaySelector {
    tracker: Arc<OutboxTracker>,
    ranker: RelayRanker,
    opts: SelectorOptions,
}

impl RelaySelector {
    /// New selector
    pub fn new(tracker: Arc<OutboxTracker>, ranker: RelayRanker, opts: SelectorOptions) -> Self {
        Self {
            tracker,
            ranker,
            opts,
        }
    }

    /// Get the tracker
    pub fn tracker(&self) -> &Arc<OutboxTracker> {
        &self.tracker
    }

    /// Relays for publishing: the author's write relays plus every `p`-tagged
    /// recipient's read relays.
    pub async fn select_for_publish(
        &self,
        author: &PublicKey,
        recipients: &[PublicKey],
        metrics: &HashMap<RelayUrl, RelayMetrics>,
    ) -> Selection {
        let blacklist: HashSet<RelayUrl> = self.tracker.blacklisted().await;
        let mut selection = Selection::default();

        match self.tracker.get(author).await {
            Some(entry) => {
                selection.relays.extend(self.ranker.top_k(
                    entry.write_relays,
                    metrics,
                    &blacklist,
                    self.opts.write_relays_per_author,
                ));
            }
            None => selection.missing.push(*author),
        }

        for recipient in recipients.iter() {
            match self.tracker.get(recipient).await {
                Some(entry) => {
                    selection.relays.extend(self.ranker.top_k(
                        entry.read_relays,
                        metrics,
                        &blacklist,
                        self.opts.read_relays_per_user,
                    ));
                }
                None => selection.missing.push(*recipient),
            }
        }

        self.cap(selection, metrics, &blacklist)
    }

    /// Relays for fetching: the union of every author's write relays.
    pub async fn select_for_fetch(
        &self,
        authors: &[PublicKey],
        metrics: &HashMap<RelayUrl, RelayMetrics>,
    ) -> Selection {
        let blacklist: HashSet<RelayUrl> = self.tracker.blacklisted().await;
        let mut selection = Selection::default();

        for author in authors.iter() {
            match self.tracker.get(author).await {
                Some(entry) => {
                    selection.relays.extend(self.ranker.top_k(
                        entry.write_relays,
                        metrics,
                        &blacklist,
                        self.opts.write_relays_per_author,
                    ));
                }
                None => selection.missing.push(*author),
            }
        }

        self.cap(selection, metrics, &blacklist)
    }

    fn cap(
        &self,
        mut selection: Selection,
        metrics: &HashMap<RelayUrl, RelayMetrics>,
        blacklist: &HashSet<RelayUrl>,
    ) -> Selection {
        if selection.relays.len() > self.opts.max_relays_per_selection {
            selection.relays = self
                .ranker
                .top_k(
                    std::mem::take(&mut selection.relays),
                    metrics,
                    blacklist,
                    self.opts.max_relays_per_selection,
                )
                .into_iter()
                .collect();
        }
        selection
    }
}

#[cfg(test)]
mod tests {
    use plover::Keys;

    use super::*;
    use crate::tracker::RelayListSource;

    fn relay(s: &str) -> RelayUrl {
        RelayUrl::parse(s).unwrap()
    }

    fn selector() -> RelaySelector {
        RelaySelector::new(
            Arc::new(OutboxTracker::default()),
            RelayRanker::default(),
            SelectorOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_publish_selection_unions_author_and_recipients() {
        let selector = selector();
        let author = Keys::generate();
        let recipient = Keys::generate();

        selector
            .tracker()
            .track(
                author.public_key(),
                [relay("wss://author-write.example.com")],
                RelayListSource::Manual,
            )
            .await;
        selector
            .tracker()
            .track(
                recipient.public_key(),
                [relay("wss://recipient-read.example.com")],
                RelayListSource::Manual,
            )
            .await;

        let selection = selector
            .select_for_publish(
                &author.public_key(),
                &[recipient.public_key()],
                &HashMap::new(),
            )
            .await;

        assert!(selection.missing.is_empty());
        assert!(selection
            .relays
            .contains(&relay("wss://author-write.example.com")));
        assert!(selection
            .relays
            .contains(&relay("wss://recipient-read.example.com")));
    }

    #[tokio::test]
    async fn test_missing_pubkeys_reported() {
        let selector = selector();
        let unknown = Keys::generate();

        let selection = selector
            .select_for_fetch(&[unknown.public_key()], &HashMap::new())
            .await;
        assert!(selection.relays.is_empty());
        assert_eq!(selection.missing, vec![unknown.public_key()]);
    }

    #[tokio::test]
    async fn test_blacklist_respected() {
        let selector = selector();
        let author = Keys::generate();
        let banned = relay("wss://banned.example.com");

        selector.tracker().blacklist(banned.clone()).await;
        selector
            .tracker()
            .track(
                author.public_key(),
                [banned, relay("wss://fine.example.com")],
                RelayListSource::Manual,
            )
            .await;

        let selection = selector
            .select_for_fetch(&[author.public_key()], &HashMap::new())
            .await;
        assert_eq!(
            selection.relays,
            [relay("wss://fine.example.com")].into()
        );
    }

    #[tokio::test]
    async fn test_selection_cap() {
        let tracker = Arc::new(OutboxTracker::default());
        let selector = RelaySelector::new(
            tracker.clone(),
            RelayRanker::default(),
            SelectorOptions {
                write_relays_per_author: 5,
                read_relays_per_user: 3,
                max_relays_per_selection: 4,
            },
        );

        // Many authors with disjoint relay lists
        let mut authors: Vec<PublicKey> = Vec::new();
        for i in 0..5 {
            let keys = Keys::generate();
            authors.push(keys.public_key());
            tracker
                .track(
                    keys.public_key(),
                    [
                        relay(&format!("wss://a{i}.example.com")),
                        relay(&format!("wss://b{i}.example.com")),
                    ],
                    RelayListSource::Manual,
                )
                .await;
        }

        let selection = selector.select_for_fetch(&authors, &HashMap::new()).await;
        assert_eq!(selection.relays.len(), 4);
    }
}
