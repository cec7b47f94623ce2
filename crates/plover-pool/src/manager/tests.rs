// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

use std::sync::Arc;

use plover::{ClientMessage, EventBuilder, Keys, Kind, PublicKey, Timestamp};
use plover_cache::MemoryCache;

use super::*;

const PK_A: &str = "f79a99714c761c0e0fea6777a70103d71d75fb7900b0894bfe6c64054807b573";
const PK_B: &str = "379e863e8357163b5bce5d2688dc4f1dcc2d505222fb8d74db600f30535dfdfe";

fn pk(hex: &str) -> PublicKey {
    PublicKey::from_hex(hex).unwrap()
}

fn author_kind_filter(hex: &str) -> Filter {
    Filter::new().author(pk(hex)).kind(Kind::TEXT_NOTE)
}

struct TestRelay {
    url: RelayUrl,
    rx: mpsc::Receiver<ClientMessage>,
}

impl TestRelay {
    async fn recv(&mut self) -> ClientMessage {
        self.rx.recv().await.expect("relay link alive")
    }

    fn try_recv(&mut self) -> Option<ClientMessage> {
        self.rx.try_recv().ok()
    }
}

async fn add_test_relay(manager: &SubscriptionManager, url: &str) -> TestRelay {
    let url: RelayUrl = RelayUrl::parse(url).unwrap();
    let (tx, rx) = mpsc::channel(64);
    manager
        .add_relay(RelayLink {
            url: url.clone(),
            sender: tx,
            limits: RelayLimits::default(),
        })
        .await;
    TestRelay { url, rx }
}

fn manager() -> SubscriptionManager {
    SubscriptionManager::new(ManagerOptions::default(), None)
}

fn manager_with_cache(cache: Arc<dyn Cache>) -> SubscriptionManager {
    SubscriptionManager::new(ManagerOptions::default(), Some(cache))
}

#[tokio::test(start_paused = true)]
async fn test_coalescing_two_subscriptions_one_req() {
    let manager = manager();
    let mut relay = add_test_relay(&manager, "wss://one.example.com").await;

    let _l1 = manager
        .subscribe(vec![author_kind_filter(PK_A)], SubscriptionOptions::default())
        .await
        .unwrap();
    let _l2 = manager
        .subscribe(vec![author_kind_filter(PK_B)], SubscriptionOptions::default())
        .await
        .unwrap();

    // Exactly one REQ whose single filter is the element-wise union
    match relay.recv().await {
        ClientMessage::Req { filters, .. } => {
            assert_eq!(filters.len(), 1);
            assert_eq!(
                filters[0],
                Filter::new()
                    .authors([pk(PK_A), pk(PK_B)])
                    .kind(Kind::TEXT_NOTE)
            );
        }
        other => panic!("expected REQ, got {other:?}"),
    }
    assert!(relay.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_incompatible_filters_get_separate_groups() {
    let manager = manager();
    let mut relay = add_test_relay(&manager, "wss://one.example.com").await;

    let _l1 = manager
        .subscribe(vec![author_kind_filter(PK_A)], SubscriptionOptions::default())
        .await
        .unwrap();
    let _l2 = manager
        .subscribe(
            // Different shape: no author constraint
            vec![Filter::new().kind(Kind::METADATA)],
            SubscriptionOptions::default(),
        )
        .await
        .unwrap();

    let first = relay.recv().await;
    let second = relay.recv().await;
    assert!(matches!(first, ClientMessage::Req { .. }));
    assert!(matches!(second, ClientMessage::Req { .. }));
    assert!(relay.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_no_grouping_when_disabled() {
    let manager = manager();
    let mut relay = add_test_relay(&manager, "wss://one.example.com").await;

    let _l1 = manager
        .subscribe(vec![author_kind_filter(PK_A)], SubscriptionOptions::default())
        .await
        .unwrap();
    let _l2 = manager
        .subscribe(
            vec![author_kind_filter(PK_B)],
            SubscriptionOptions::default().group_with_peers(false),
        )
        .await
        .unwrap();

    assert!(matches!(relay.recv().await, ClientMessage::Req { .. }));
    assert!(matches!(relay.recv().await, ClientMessage::Req { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_event_fan_out_and_dedup() {
    let manager = manager();
    let mut relay = add_test_relay(&manager, "wss://one.example.com").await;

    let keys_a = Keys::generate();
    let keys_b = Keys::generate();

    let mut l1 = manager
        .subscribe(
            vec![Filter::new().author(keys_a.public_key()).kind(Kind::TEXT_NOTE)],
            SubscriptionOptions::default(),
        )
        .await
        .unwrap();
    let mut l2 = manager
        .subscribe(
            vec![Filter::new().author(keys_b.public_key()).kind(Kind::TEXT_NOTE)],
            SubscriptionOptions::default(),
        )
        .await
        .unwrap();

    let wire_id = match relay.recv().await {
        ClientMessage::Req {
            subscription_id, ..
        } => subscription_id,
        other => panic!("expected REQ, got {other:?}"),
    };

    let event = EventBuilder::text_note("from A").sign_with_keys(&keys_a).unwrap();

    // Same event delivered twice by the relay: routed once
    for _ in 0..2 {
        manager
            .process(
                relay.url.clone(),
                RelayMessage::Event {
                    subscription_id: wire_id.clone(),
                    event: Box::new(event.clone()),
                },
            )
            .await;
    }
    manager
        .process(
            relay.url.clone(),
            RelayMessage::EndOfStoredEvents(wire_id.clone()),
        )
        .await;

    match l1.recv().await.unwrap() {
        SubscriptionUpdate::Event {
            event: received,
            relay_url,
        } => {
            assert_eq!(*received, event);
            assert_eq!(relay_url, Some(relay.url.clone()));
        }
        other => panic!("expected event, got {other:?}"),
    }
    // The EOSE right after proves the duplicate was not delivered
    assert!(matches!(
        l1.recv().await.unwrap(),
        SubscriptionUpdate::Eose
    ));

    // The other member's filters don't match the event
    assert!(matches!(
        l2.recv().await.unwrap(),
        SubscriptionUpdate::Eose
    ));
}

#[tokio::test(start_paused = true)]
async fn test_eose_aggregation_across_relays() {
    let manager = manager();
    let mut r1 = add_test_relay(&manager, "wss://one.example.com").await;
    let mut r2 = add_test_relay(&manager, "wss://two.example.com").await;

    let mut handle = manager
        .subscribe(vec![author_kind_filter(PK_A)], SubscriptionOptions::default())
        .await
        .unwrap();

    let wire_1 = match r1.recv().await {
        ClientMessage::Req {
            subscription_id, ..
        } => subscription_id,
        other => panic!("expected REQ, got {other:?}"),
    };
    let wire_2 = match r2.recv().await {
        ClientMessage::Req {
            subscription_id, ..
        } => subscription_id,
        other => panic!("expected REQ, got {other:?}"),
    };

    // One relay is not enough
    manager
        .process(r1.url.clone(), RelayMessage::EndOfStoredEvents(wire_1))
        .await;
    tokio::task::yield_now().await;
    assert!(!handle.state().is_eosed());

    // EOSE fires once every targeted relay reported it
    manager
        .process(r2.url.clone(), RelayMessage::EndOfStoredEvents(wire_2))
        .await;
    handle.await_eose().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_close_on_eose() {
    let manager = manager();
    let mut relay = add_test_relay(&manager, "wss://one.example.com").await;

    let mut handle = manager
        .subscribe(
            vec![author_kind_filter(PK_A)],
            SubscriptionOptions::default().close_on_eose(true),
        )
        .await
        .unwrap();

    let wire_id = match relay.recv().await {
        ClientMessage::Req {
            subscription_id, ..
        } => subscription_id,
        other => panic!("expected REQ, got {other:?}"),
    };

    manager
        .process(
            relay.url.clone(),
            RelayMessage::EndOfStoredEvents(wire_id.clone()),
        )
        .await;

    handle.await_eose().await.unwrap();

    // The group had a single member: a CLOSE goes out
    match relay.recv().await {
        ClientMessage::Close(closed_id) => assert_eq!(closed_id, wire_id),
        other => panic!("expected CLOSE, got {other:?}"),
    }
    assert_eq!(handle.state(), SubscriptionState::Closed { eosed: true });
}

#[tokio::test(start_paused = true)]
async fn test_close_prunes_group() {
    let manager = manager();
    let mut relay = add_test_relay(&manager, "wss://one.example.com").await;

    let l1 = manager
        .subscribe(vec![author_kind_filter(PK_A)], SubscriptionOptions::default())
        .await
        .unwrap();
    let _l2 = manager
        .subscribe(vec![author_kind_filter(PK_B)], SubscriptionOptions::default())
        .await
        .unwrap();

    // Coalesced into one REQ
    assert!(matches!(relay.recv().await, ClientMessage::Req { .. }));

    // Removing a member that contributed a unique author re-issues the REQ
    // with the pruned filter set
    l1.close().await;
    match relay.recv().await {
        ClientMessage::Req { filters, .. } => {
            assert_eq!(filters, vec![author_kind_filter(PK_B)]);
        }
        other => panic!("expected REQ, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_close_last_member_sends_close() {
    let manager = manager();
    let mut relay = add_test_relay(&manager, "wss://one.example.com").await;

    let handle = manager
        .subscribe(vec![author_kind_filter(PK_A)], SubscriptionOptions::default())
        .await
        .unwrap();

    let wire_id = match relay.recv().await {
        ClientMessage::Req {
            subscription_id, ..
        } => subscription_id,
        other => panic!("expected REQ, got {other:?}"),
    };

    handle.close().await;
    match relay.recv().await {
        ClientMessage::Close(closed_id) => assert_eq!(closed_id, wire_id),
        other => panic!("expected CLOSE, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_cache_only_never_contacts_relays() {
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
    let keys = Keys::generate();
    let cached = EventBuilder::text_note("cached")
        .custom_created_at(Timestamp::from(1000))
        .sign_with_keys(&keys)
        .unwrap();
    cache.save_event(&cached, &[], None).await.unwrap();

    let manager = manager_with_cache(cache);
    let mut relay = add_test_relay(&manager, "wss://one.example.com").await;

    let mut handle = manager
        .subscribe(
            vec![Filter::new().author(keys.public_key())],
            SubscriptionOptions::default().cache_usage(CacheUsage::CacheOnly),
        )
        .await
        .unwrap();

    match handle.recv().await.unwrap() {
        SubscriptionUpdate::Event { event, relay_url } => {
            assert_eq!(*event, cached);
            assert_eq!(relay_url, None);
        }
        other => panic!("expected event, got {other:?}"),
    }
    assert!(matches!(
        handle.recv().await.unwrap(),
        SubscriptionUpdate::Eose
    ));

    tokio::task::yield_now().await;
    assert!(relay.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_cache_first_satisfied_by_limit() {
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
    let keys = Keys::generate();
    let cached = EventBuilder::text_note("cached")
        .custom_created_at(Timestamp::from(1000))
        .sign_with_keys(&keys)
        .unwrap();
    cache.save_event(&cached, &[], None).await.unwrap();

    let manager = manager_with_cache(cache);
    let mut relay = add_test_relay(&manager, "wss://one.example.com").await;

    // The limit is met by the cache: no relay round-trip
    let mut handle = manager
        .subscribe(
            vec![Filter::new().author(keys.public_key()).limit(1)],
            SubscriptionOptions::default(),
        )
        .await
        .unwrap();

    assert!(matches!(
        handle.recv().await.unwrap(),
        SubscriptionUpdate::Event { .. }
    ));
    handle.await_eose().await.unwrap();

    tokio::task::yield_now().await;
    assert!(relay.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_no_relays_surfaces_error() {
    let manager = manager();

    let mut handle = manager
        .subscribe(vec![author_kind_filter(PK_A)], SubscriptionOptions::default())
        .await
        .unwrap();

    match handle.recv().await.unwrap() {
        SubscriptionUpdate::Error(SubscriptionError::NoRelaysAvailable) => {}
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_relay_added_later_extends_subscription() {
    let manager = manager();

    let mut handle = manager
        .subscribe(vec![author_kind_filter(PK_A)], SubscriptionOptions::default())
        .await
        .unwrap();

    // No relays yet
    assert!(matches!(
        handle.recv().await.unwrap(),
        SubscriptionUpdate::Error(SubscriptionError::NoRelaysAvailable)
    ));

    let mut relay = add_test_relay(&manager, "wss://late.example.com").await;
    match relay.recv().await {
        ClientMessage::Req { filters, .. } => {
            assert_eq!(filters, vec![author_kind_filter(PK_A)]);
        }
        other => panic!("expected REQ, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_unknown_wire_id_ignored() {
    let manager = manager();
    let mut relay = add_test_relay(&manager, "wss://one.example.com").await;

    let keys = Keys::generate();
    let mut handle = manager
        .subscribe(
            vec![Filter::new().author(keys.public_key())],
            SubscriptionOptions::default(),
        )
        .await
        .unwrap();
    let wire_id = match relay.recv().await {
        ClientMessage::Req {
            subscription_id, ..
        } => subscription_id,
        other => panic!("expected REQ, got {other:?}"),
    };

    let event = EventBuilder::text_note("stray").sign_with_keys(&keys).unwrap();
    manager
        .process(
            relay.url.clone(),
            RelayMessage::Event {
                subscription_id: SubscriptionId::new("never-issued"),
                event: Box::new(event),
            },
        )
        .await;
    manager
        .process(relay.url.clone(), RelayMessage::EndOfStoredEvents(wire_id))
        .await;

    // The EOSE arrives first: the stray event was ignored
    assert!(matches!(
        handle.recv().await.unwrap(),
        SubscriptionUpdate::Eose
    ));
}

#[tokio::test(start_paused = true)]
async fn test_explicit_relay_set() {
    let manager = manager();
    let mut r1 = add_test_relay(&manager, "wss://one.example.com").await;
    let mut r2 = add_test_relay(&manager, "wss://two.example.com").await;

    let _handle = manager
        .subscribe(
            vec![author_kind_filter(PK_A)],
            SubscriptionOptions::default().relay_set([r1.url.clone()]),
        )
        .await
        .unwrap();

    assert!(matches!(r1.recv().await, ClientMessage::Req { .. }));
    tokio::task::yield_now().await;
    assert!(r2.try_recv().is_none());
}
