// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Subscription manager.
//!
//! A single actor owns the registry of logical subscriptions and the
//! per-relay group tables. Callers post commands through a channel; event
//! fan-out to the per-subscription buffers never blocks the actor.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use plover::{Event, EventId, Filter, RelayMessage, RelayUrl, SubscriptionId};
use plover_cache::Cache;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

mod group;
mod subscription;

use self::group::RelayGroup;
pub use self::subscription::{
    AwaitEoseError, CacheUsage, SubscriptionError, SubscriptionHandle, SubscriptionOptions,
    SubscriptionState, SubscriptionUpdate, DEFAULT_EVENT_BUFFER_SIZE,
};
use crate::relay::RelayLimits;

const COMMAND_CHANNEL_SIZE: usize = 4096;

/// Default group-commit window: pending subscriptions enqueued within this
/// window are flushed as one batch, coalescing compatible filters.
pub const DEFAULT_GROUP_COMMIT_WINDOW: Duration = Duration::from_millis(100);

/// Manager error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Filters can't be empty
    #[error("filters empty")]
    FiltersEmpty,
    /// The manager actor is gone
    #[error("subscription manager shut down")]
    Shutdown,
}

/// Manager options
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Group-commit window
    pub group_commit_window: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            group_commit_window: DEFAULT_GROUP_COMMIT_WINDOW,
        }
    }
}

/// Writing side of a relay, as seen by the manager
#[derive(Debug, Clone)]
pub(crate) struct RelayLink {
    pub(crate) url: RelayUrl,
    pub(crate) sender: mpsc::Sender<plover::ClientMessage>,
    pub(crate) limits: RelayLimits,
}

#[derive(Debug)]
pub(crate) enum Command {
    Subscribe(Box<PendingSubscribe>),
    Close(SubscriptionId),
    AddRelay(RelayLink),
    RemoveRelay(RelayUrl),
    Incoming(RelayUrl, RelayMessage),
}

#[derive(Debug)]
pub(crate) struct PendingSubscribe {
    id: SubscriptionId,
    filters: Vec<Filter>,
    options: SubscriptionOptions,
    updates: mpsc::Sender<SubscriptionUpdate>,
    state: watch::Sender<SubscriptionState>,
}

/// Subscription manager handle
#[derive(Debug, Clone)]
pub struct SubscriptionManager {
    tx: mpsc::Sender<Command>,
}

impl SubscriptionManager {
    /// Spawn the manager actor.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(opts: ManagerOptions, cache: Option<Arc<dyn Cache>>) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let actor = Actor {
            opts,
            cache,
            rx,
            relays: HashMap::new(),
            registry: HashMap::new(),
            groups: HashMap::new(),
            pending: Vec::new(),
        };
        tokio::spawn(actor.run());
        Self { tx }
    }

    /// Register a logical subscription
    pub async fn subscribe(
        &self,
        filters: Vec<Filter>,
        options: SubscriptionOptions,
    ) -> Result<SubscriptionHandle, Error> {
        if filters.is_empty() {
            return Err(Error::FiltersEmpty);
        }

        let id: SubscriptionId = SubscriptionId::generate();
        let (updates_tx, updates_rx) = mpsc::channel(options.event_buffer_size.max(1));
        let (state_tx, state_rx) = watch::channel(SubscriptionState::Pending);

        self.tx
            .send(Command::Subscribe(Box::new(PendingSubscribe {
                id: id.clone(),
                filters,
                options,
                updates: updates_tx,
                state: state_tx,
            })))
            .await
            .map_err(|_| Error::Shutdown)?;

        Ok(SubscriptionHandle {
            id,
            updates: updates_rx,
            state: state_rx,
            to_manager: self.tx.clone(),
        })
    }

    /// Close a logical subscription
    pub async fn close(&self, id: SubscriptionId) {
        let _ = self.tx.send(Command::Close(id)).await;
    }

    pub(crate) async fn add_relay(&self, link: RelayLink) {
        let _ = self.tx.send(Command::AddRelay(link)).await;
    }

    pub(crate) async fn remove_relay(&self, url: RelayUrl) {
        let _ = self.tx.send(Command::RemoveRelay(url)).await;
    }

    /// Route an incoming relay message (EVENT, EOSE, CLOSED) to the actor
    pub(crate) async fn process(&self, relay_url: RelayUrl, message: RelayMessage) {
        let _ = self.tx.send(Command::Incoming(relay_url, message)).await;
    }
}

struct Entry {
    filters: Vec<Filter>,
    options: SubscriptionOptions,
    state: SubscriptionState,
    state_tx: watch::Sender<SubscriptionState>,
    updates: mpsc::Sender<SubscriptionUpdate>,
    /// Events that did not fit in the delivery buffer; drained before any new
    /// delivery so ordering is preserved
    overflow: VecDeque<SubscriptionUpdate>,
    seen: HashSet<EventId>,
    targeted: HashSet<RelayUrl>,
    eosed_relays: HashSet<RelayUrl>,
}

impl Entry {
    fn set_state(&mut self, state: SubscriptionState) {
        self.state = state;
        let _ = self.state_tx.send(state);
    }

    /// Deliver an update without blocking. Returns `false` when the receiver
    /// is gone.
    fn deliver(&mut self, update: SubscriptionUpdate) -> bool {
        // Drain overflow first to preserve ordering
        while let Some(front) = self.overflow.pop_front() {
            match self.updates.try_send(front) {
                Ok(()) => {}
                Err(TrySendError::Full(front)) => {
                    self.overflow.push_front(front);
                    break;
                }
                Err(TrySendError::Closed(..)) => return false,
            }
        }

        if !self.overflow.is_empty() {
            self.overflow.push_back(update);
            return true;
        }

        match self.updates.try_send(update) {
            Ok(()) => true,
            Err(TrySendError::Full(update)) => {
                self.overflow.push_back(update);
                true
            }
            Err(TrySendError::Closed(..)) => false,
        }
    }
}

struct Actor {
    opts: ManagerOptions,
    cache: Option<Arc<dyn Cache>>,
    rx: mpsc::Receiver<Command>,
    relays: HashMap<RelayUrl, RelayLink>,
    registry: HashMap<SubscriptionId, Entry>,
    groups: HashMap<RelayUrl, Vec<RelayGroup>>,
    /// Subscriptions awaiting the group-commit flush
    pending: Vec<(SubscriptionId, Vec<RelayUrl>)>,
}

impl Actor {
    async fn run(mut self) {
        let mut flush_at: Option<Instant> = None;

        loop {
            let deadline: Instant = flush_at.unwrap_or_else(Instant::now);
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(command) => self.handle_command(command, &mut flush_at).await,
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline), if flush_at.is_some() => {
                    flush_at = None;
                    self.flush().await;
                }
            }
        }

        tracing::debug!("Subscription manager actor terminated.");
    }

    async fn handle_command(&mut self, command: Command, flush_at: &mut Option<Instant>) {
        match command {
            Command::Subscribe(pending) => self.handle_subscribe(*pending, flush_at).await,
            Command::Close(id) => self.close_subscription(&id, None).await,
            Command::AddRelay(link) => self.handle_add_relay(link, flush_at),
            Command::RemoveRelay(url) => self.handle_remove_relay(&url).await,
            Command::Incoming(relay_url, message) => {
                self.handle_incoming(relay_url, message).await
            }
        }
    }

    async fn handle_subscribe(
        &mut self,
        pending: PendingSubscribe,
        flush_at: &mut Option<Instant>,
    ) {
        let PendingSubscribe {
            id,
            filters,
            options,
            updates,
            state,
        } = pending;

        let mut entry = Entry {
            filters,
            options,
            state: SubscriptionState::Pending,
            state_tx: state,
            updates,
            overflow: VecDeque::new(),
            seen: HashSet::new(),
            targeted: HashSet::new(),
            eosed_relays: HashSet::new(),
        };

        // Cache-first resolution
        let cache_satisfied: bool = match entry.options.cache_usage {
            CacheUsage::RelayOnly => false,
            usage => {
                let satisfied: bool = self.resolve_from_cache(&mut entry).await;
                usage == CacheUsage::CacheOnly || (usage == CacheUsage::CacheFirst && satisfied)
            }
        };

        if cache_satisfied {
            entry.set_state(SubscriptionState::Eosed);
            entry.deliver(SubscriptionUpdate::Eose);
            if entry.options.close_on_eose {
                entry.set_state(SubscriptionState::Closed { eosed: true });
                entry.deliver(SubscriptionUpdate::Closed);
            } else {
                self.registry.insert(id, entry);
            }
            return;
        }

        // Relay targeting: explicit set or the whole pool
        let targets: Vec<RelayUrl> = match &entry.options.relay_set {
            Some(relays) => relays.clone(),
            None => self.relays.keys().cloned().collect(),
        };

        if targets.is_empty() {
            tracing::warn!("No relays available for subscription '{id}'");
            entry.deliver(SubscriptionUpdate::Error(
                SubscriptionError::NoRelaysAvailable,
            ));
        }

        self.registry.insert(id.clone(), entry);

        if !targets.is_empty() {
            self.enqueue(id, targets, flush_at);
        }
    }

    /// Query the cache and deliver matches through the normal event path.
    ///
    /// Returns `true` when every filter with a `limit` was satisfied, i.e. a
    /// cache-first subscription does not need the relays.
    async fn resolve_from_cache(&self, entry: &mut Entry) -> bool {
        let cache: &Arc<dyn Cache> = match &self.cache {
            Some(cache) => cache,
            None => return false,
        };

        let events: Vec<Event> = match cache.query(&entry.filters).await {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!("Cache query failed: {e}");
                entry.deliver(SubscriptionUpdate::Error(
                    SubscriptionError::CacheUnavailable(e.to_string()),
                ));
                return false;
            }
        };

        for event in events.into_iter() {
            if entry.seen.insert(event.id) {
                entry.deliver(SubscriptionUpdate::Event {
                    event: Box::new(event),
                    relay_url: None,
                });
            }
        }

        // Satisfied only when every filter carries a limit that the cache met
        entry.filters.iter().all(|filter| match filter.limit {
            Some(limit) => entry.seen.len() >= limit,
            None => false,
        })
    }

    fn enqueue(
        &mut self,
        id: SubscriptionId,
        targets: Vec<RelayUrl>,
        flush_at: &mut Option<Instant>,
    ) {
        self.pending.push((id, targets));
        if flush_at.is_none() {
            *flush_at = Some(Instant::now() + self.opts.group_commit_window);
        }
    }

    /// Flush pending adds: coalesce into per-relay groups and issue the REQs
    async fn flush(&mut self) {
        let pending: Vec<(SubscriptionId, Vec<RelayUrl>)> = std::mem::take(&mut self.pending);
        let mut touched: HashSet<(RelayUrl, SubscriptionId)> = HashSet::new();

        for (sub_id, targets) in pending.into_iter() {
            let entry = match self.registry.get_mut(&sub_id) {
                Some(entry) if !entry.state.is_closed() => entry,
                _ => continue,
            };
            let filters: Vec<Filter> = entry.filters.clone();
            let group_with_peers: bool = entry.options.group_with_peers;

            for relay_url in targets.into_iter() {
                let link = match self.relays.get(&relay_url) {
                    Some(link) => link.clone(),
                    None => continue,
                };

                let groups: &mut Vec<RelayGroup> = self.groups.entry(relay_url.clone()).or_default();

                // Search for a compatible open group
                let mut joined: Option<SubscriptionId> = None;
                if group_with_peers {
                    for group in groups.iter_mut() {
                        if let Some((merged, bitmap)) =
                            group.try_merge(&filters, link.limits.max_filters)
                        {
                            group.commit(sub_id.clone(), merged, bitmap);
                            joined = Some(group.wire_id.clone());
                            break;
                        }
                    }
                }

                match joined {
                    Some(wire_id) => {
                        touched.insert((relay_url.clone(), wire_id));
                    }
                    None => {
                        // Filter sets beyond the relay limit split into
                        // multiple groups
                        let chunk_size: usize = link.limits.max_filters.clamp(1, 64);
                        for chunk in filters.chunks(chunk_size) {
                            let wire_id: SubscriptionId = SubscriptionId::generate()
                                .truncated(link.limits.max_subid_length);
                            groups.push(RelayGroup::new(
                                wire_id.clone(),
                                sub_id.clone(),
                                chunk.to_vec(),
                            ));
                            touched.insert((relay_url.clone(), wire_id));
                        }
                    }
                }

                if let Some(entry) = self.registry.get_mut(&sub_id) {
                    entry.targeted.insert(relay_url.clone());
                    if entry.state == SubscriptionState::Pending {
                        entry.set_state(SubscriptionState::Active);
                    }
                }
            }
        }

        // One REQ per touched group
        for (relay_url, wire_id) in touched.into_iter() {
            self.issue_req(&relay_url, &wire_id).await;
        }
    }

    async fn issue_req(&self, relay_url: &RelayUrl, wire_id: &SubscriptionId) {
        let link = match self.relays.get(relay_url) {
            Some(link) => link,
            None => return,
        };
        let group = match self
            .groups
            .get(relay_url)
            .and_then(|groups| groups.iter().find(|g| &g.wire_id == wire_id))
        {
            Some(group) => group,
            None => return,
        };

        let msg = plover::ClientMessage::req(group.wire_id.clone(), group.filters.clone());
        if link.sender.send(msg).await.is_err() {
            tracing::warn!("Relay link for '{relay_url}' is gone");
        }
    }

    fn handle_add_relay(&mut self, link: RelayLink, flush_at: &mut Option<Instant>) {
        let url: RelayUrl = link.url.clone();
        self.relays.insert(url.clone(), link);

        // Extend live subscriptions without an explicit relay set
        let ids: Vec<SubscriptionId> = self
            .registry
            .iter()
            .filter(|(_, entry)| {
                !entry.state.is_closed()
                    && entry.options.relay_set.is_none()
                    && entry.options.cache_usage != CacheUsage::CacheOnly
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in ids.into_iter() {
            self.enqueue(id, vec![url.clone()], flush_at);
        }
    }

    async fn handle_remove_relay(&mut self, url: &RelayUrl) {
        self.relays.remove(url);
        self.groups.remove(url);

        let ids: Vec<SubscriptionId> = self.registry.keys().cloned().collect();
        for id in ids.into_iter() {
            let completed: bool = match self.registry.get_mut(&id) {
                Some(entry) => {
                    entry.targeted.remove(url);
                    entry.eosed_relays.remove(url);
                    !entry.state.is_closed()
                        && !entry.state.is_eosed()
                        && !entry.targeted.is_empty()
                        && entry.targeted.iter().all(|r| entry.eosed_relays.contains(r))
                }
                None => false,
            };
            // Shrinking the target set can complete an EOSE
            if completed {
                self.complete_eose(&id).await;
            }
        }
    }

    async fn handle_incoming(&mut self, relay_url: RelayUrl, message: RelayMessage) {
        match message {
            RelayMessage::Event {
                subscription_id,
                event,
            } => self.process_event(&relay_url, &subscription_id, event).await,
            RelayMessage::EndOfStoredEvents(subscription_id) => {
                self.process_eose(&relay_url, &subscription_id).await
            }
            RelayMessage::Closed {
                subscription_id, ..
            } => self.process_group_closed(&relay_url, &subscription_id).await,
            // OK, NOTICE, AUTH and COUNT are routed elsewhere
            _ => {}
        }
    }

    async fn process_event(
        &mut self,
        relay_url: &RelayUrl,
        wire_id: &SubscriptionId,
        event: Box<Event>,
    ) {
        // Unknown wire subscription ids are ignored
        let group = match self
            .groups
            .get(relay_url)
            .and_then(|groups| groups.iter().find(|g| &g.wire_id == wire_id))
        {
            Some(group) => group,
            None => return,
        };

        let mask: u64 = group.match_mask(&event);
        if mask == 0 {
            return;
        }

        let members: Vec<(SubscriptionId, u64)> = group
            .members
            .iter()
            .map(|(id, bitmap)| (id.clone(), *bitmap))
            .collect();

        let mut cache_filters: Option<Vec<Filter>> = None;
        let mut dead: Vec<SubscriptionId> = Vec::new();

        for (member_id, bitmap) in members.into_iter() {
            if bitmap & mask == 0 {
                continue;
            }
            if let Some(entry) = self.registry.get_mut(&member_id) {
                if entry.state.is_closed() {
                    continue;
                }
                if !entry.filters.iter().any(|f| f.match_event(&event)) {
                    continue;
                }
                if !entry.seen.insert(event.id) {
                    continue;
                }
                if cache_filters.is_none() {
                    cache_filters = Some(entry.filters.clone());
                }
                let alive: bool = entry.deliver(SubscriptionUpdate::Event {
                    event: event.clone(),
                    relay_url: Some(relay_url.clone()),
                });
                if !alive {
                    dead.push(member_id);
                }
            }
        }

        // Store with the originating filters attached; the relay is recorded
        // as a source on the event
        if let (Some(cache), Some(filters)) = (&self.cache, cache_filters) {
            if let Err(e) = cache.save_event(&event, &filters, Some(relay_url)).await {
                tracing::warn!("Impossible to save event {}: {e}", event.id);
            }
        }

        for member_id in dead.into_iter() {
            self.close_subscription(&member_id, None).await;
        }
    }

    async fn process_eose(&mut self, relay_url: &RelayUrl, wire_id: &SubscriptionId) {
        let members: Vec<SubscriptionId> = match self
            .groups
            .get_mut(relay_url)
            .and_then(|groups| groups.iter_mut().find(|g| &g.wire_id == wire_id))
        {
            Some(group) => {
                group.eose = true;
                group.members.keys().cloned().collect()
            }
            None => return,
        };

        for member_id in members.into_iter() {
            // The relay counts as EOSEd for a member only once every group
            // covering that member reported it
            let relay_done: bool = self
                .groups
                .get(relay_url)
                .map(|groups| {
                    groups
                        .iter()
                        .filter(|g| g.contains(&member_id))
                        .all(|g| g.eose)
                })
                .unwrap_or(true);
            if !relay_done {
                continue;
            }

            let completed: bool = match self.registry.get_mut(&member_id) {
                Some(entry) if !entry.state.is_closed() && !entry.state.is_eosed() => {
                    entry.eosed_relays.insert(relay_url.clone());
                    entry.targeted.iter().all(|r| entry.eosed_relays.contains(r))
                }
                _ => false,
            };
            if completed {
                self.complete_eose(&member_id).await;
            }
        }
    }

    async fn complete_eose(&mut self, id: &SubscriptionId) {
        let close_on_eose: bool = match self.registry.get_mut(id) {
            Some(entry) => {
                entry.set_state(SubscriptionState::Eosed);
                entry.deliver(SubscriptionUpdate::Eose);
                entry.options.close_on_eose
            }
            None => return,
        };

        if close_on_eose {
            self.close_subscription(id, Some(true)).await;
        }
    }

    /// Tear down a logical subscription.
    ///
    /// Closing an already-closed (or unknown) subscription is a no-op.
    async fn close_subscription(&mut self, id: &SubscriptionId, eosed: Option<bool>) {
        let mut entry = match self.registry.remove(id) {
            Some(entry) => entry,
            None => return,
        };

        // Cancel any pending batched REQ
        self.pending.retain(|(pending_id, _)| pending_id != id);

        let eosed: bool = eosed.unwrap_or_else(|| entry.state.is_eosed());
        entry.set_state(SubscriptionState::Closed { eosed });
        entry.deliver(SubscriptionUpdate::Closed);

        // Remove from every group; empty groups are CLOSEd, shrunk groups are
        // re-issued with the pruned filter set
        for (relay_url, groups) in self.groups.iter_mut() {
            let link = match self.relays.get(relay_url) {
                Some(link) => link.clone(),
                None => continue,
            };

            let mut index: usize = 0;
            while index < groups.len() {
                if !groups[index].contains(id) {
                    index += 1;
                    continue;
                }

                groups[index].members.remove(id);

                if groups[index].members.is_empty() {
                    let wire_id: SubscriptionId = groups[index].wire_id.clone();
                    groups.remove(index);
                    let _ = link
                        .sender
                        .send(plover::ClientMessage::close(wire_id))
                        .await;
                    continue;
                }

                // Rebuild the merged filters from the remaining members
                let member_filters: Vec<(SubscriptionId, Vec<Filter>)> = groups[index]
                    .members
                    .keys()
                    .filter_map(|member_id| {
                        self.registry
                            .get(member_id)
                            .map(|entry| (member_id.clone(), entry.filters.clone()))
                    })
                    .collect();

                if let Some((merged, bitmaps)) = group::rebuild(&member_filters) {
                    if merged != groups[index].filters {
                        groups[index].filters = merged.clone();
                        groups[index].members = bitmaps;
                        let _ = link
                            .sender
                            .send(plover::ClientMessage::req(
                                groups[index].wire_id.clone(),
                                merged,
                            ))
                            .await;
                    }
                }

                index += 1;
            }
        }
    }

    async fn process_group_closed(&mut self, relay_url: &RelayUrl, wire_id: &SubscriptionId) {
        // The relay refused or dropped the group: treat it as EOSE for
        // aggregation purposes so member subscriptions don't hang, then drop
        // the group (a reconnect re-issues it from the relay bookkeeping).
        self.process_eose(relay_url, wire_id).await;
        if let Some(groups) = self.groups.get_mut(relay_url) {
            groups.retain(|group| &group.wire_id != wire_id);
        }
    }
}

#[cfg(test)]
mod tests;
