// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_utility::{task, time};
use async_wsocket::futures_util::{SinkExt, StreamExt};
use async_wsocket::{connect as wsocket_connect, ConnectionMode, Sink, Stream, WsMessage};
use atomic_destructor::AtomicDestroyer;
use plover::nips::nip11::RelayInformationDocument;
use plover::{
    ClientMessage, Event, EventId, Filter, JsonUtil, Kind, RelayMessage, RelayUrl, SubscriptionId,
    Timestamp,
};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::{broadcast, watch, Mutex, MutexGuard, RwLock};

use super::backoff::Backoff;
use super::error::Error;
use super::options::RelayOptions;
use super::stats::RelayConnectionStats;
use super::status::{AtomicRelayStatus, RelayStatus};
use super::verification::{SamplerDecision, VerificationSampler};
use super::RelayNotification;

const NIP11_REFRESH_INTERVAL: u64 = 3600;
const WAIT_FOR_OK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelayServiceEvent {
    /// None
    None,
    /// Wake a parked connection loop
    Connect,
    /// Drop the current session, keep the loop alive
    Interrupt,
    /// Completely disconnect
    Terminate,
}

#[derive(Debug)]
struct RelayChannels {
    nostr: (Sender<ClientMessage>, Mutex<Receiver<ClientMessage>>),
    service: (
        watch::Sender<RelayServiceEvent>,
        Mutex<watch::Receiver<RelayServiceEvent>>,
    ),
}

impl RelayChannels {
    fn new(queue_size: usize) -> Self {
        let (tx_nostr, rx_nostr) = mpsc::channel::<ClientMessage>(queue_size);
        let (tx_service, rx_service) = watch::channel::<RelayServiceEvent>(RelayServiceEvent::None);

        Self {
            nostr: (tx_nostr, Mutex::new(rx_nostr)),
            service: (tx_service, Mutex::new(rx_service)),
        }
    }

    fn try_send_nostr(&self, msg: ClientMessage) -> Result<(), Error> {
        self.nostr.0.try_send(msg).map_err(|_| Error::QueueFull)
    }

    async fn rx_nostr(&self) -> MutexGuard<'_, Receiver<ClientMessage>> {
        self.nostr.1.lock().await
    }

    async fn rx_service(&self) -> MutexGuard<'_, watch::Receiver<RelayServiceEvent>> {
        self.service.1.lock().await
    }

    fn send_service(&self, event: RelayServiceEvent) -> Result<(), Error> {
        self.service.0.send(event).map_err(|_| Error::Shutdown)
    }
}

#[derive(Debug, Clone, Default)]
struct SubscriptionData {
    filters: Vec<Filter>,
    subscribed_at: Timestamp,
    /// Subscription closed by relay
    closed: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct InnerRelay {
    pub(super) url: RelayUrl,
    status: Arc<AtomicRelayStatus>,
    last_error: Arc<RwLock<Option<String>>>,
    pub(super) opts: RelayOptions,
    pub(super) stats: RelayConnectionStats,
    pub(super) sampler: Arc<VerificationSampler>,
    document: Arc<RwLock<RelayInformationDocument>>,
    last_document_fetch: Arc<AtomicU64>,
    challenge: Arc<RwLock<Option<String>>>,
    channels: Arc<RelayChannels>,
    subscriptions: Arc<RwLock<HashMap<SubscriptionId, SubscriptionData>>>,
    /// Parsed messages forwarded to the pool router
    to_pool: Sender<(RelayUrl, RelayMessage)>,
    pub(super) notifications: broadcast::Sender<RelayNotification>,
    running: Arc<AtomicBool>,
    /// The relay is wanted: keep the backoff loop scheduling new attempts
    desired: Arc<AtomicBool>,
}

impl AtomicDestroyer for InnerRelay {
    fn on_destroy(&self) {
        if let Err(e) = self.disconnect() {
            tracing::error!("Impossible to shutdown '{}': {e}", self.url);
        }
    }
}

impl InnerRelay {
    pub(crate) fn new(
        url: RelayUrl,
        opts: RelayOptions,
        to_pool: Sender<(RelayUrl, RelayMessage)>,
    ) -> Self {
        let (notifications, ..) = broadcast::channel::<RelayNotification>(2048);
        let queue_size: usize = opts.outbound_queue_size;
        let sampler: Arc<VerificationSampler> =
            Arc::new(VerificationSampler::new(opts.sampler));

        Self {
            url,
            status: Arc::new(AtomicRelayStatus::default()),
            last_error: Arc::new(RwLock::new(None)),
            opts,
            stats: RelayConnectionStats::default(),
            sampler,
            document: Arc::new(RwLock::new(RelayInformationDocument::new())),
            last_document_fetch: Arc::new(AtomicU64::new(0)),
            challenge: Arc::new(RwLock::new(None)),
            channels: Arc::new(RelayChannels::new(queue_size)),
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            to_pool,
            notifications,
            running: Arc::new(AtomicBool::new(false)),
            desired: Arc::new(AtomicBool::new(false)),
        }
    }

    #[inline]
    pub(crate) fn status(&self) -> RelayStatus {
        self.status.load()
    }

    #[inline]
    pub(crate) fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    fn set_status(&self, status: RelayStatus) {
        self.status.set(status);

        match status {
            RelayStatus::Connecting => tracing::debug!("Connecting to '{}'", self.url),
            RelayStatus::Connected => tracing::info!("Connected to '{}'", self.url),
            RelayStatus::Disconnecting => tracing::debug!("Disconnecting from '{}'", self.url),
            RelayStatus::Disconnected => tracing::info!("Disconnected from '{}'", self.url),
            RelayStatus::Failed => tracing::debug!("Connection to '{}' failed", self.url),
        }

        let _ = self
            .notifications
            .send(RelayNotification::StatusChanged { status });
    }

    pub(crate) async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    pub(crate) async fn document(&self) -> RelayInformationDocument {
        self.document.read().await.clone()
    }

    pub(crate) async fn challenge(&self) -> Option<String> {
        self.challenge.read().await.clone()
    }

    pub(crate) async fn subscriptions(&self) -> HashMap<SubscriptionId, Vec<Filter>> {
        let subscriptions = self.subscriptions.read().await;
        subscriptions
            .iter()
            .map(|(k, v)| (k.clone(), v.filters.clone()))
            .collect()
    }

    /// Mark the relay as desired and make sure a connection loop is running.
    ///
    /// Connecting an already-connected relay is a no-op.
    pub(crate) fn connect(&self) {
        self.desired.store(true, Ordering::SeqCst);

        // Wake a parked loop and overwrite any stale terminate left behind by
        // a previous session
        let _ = self.channels.send_service(RelayServiceEvent::Connect);

        if !self.running.load(Ordering::SeqCst) {
            self.spawn_connection_task();
        }
    }

    fn spawn_connection_task(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let relay = self.clone();
        task::spawn(async move {
            let mut backoff: Backoff = Backoff::new(relay.opts.retry_base, relay.opts.retry_cap);

            loop {
                if relay.connect_and_run(&mut backoff).await {
                    relay.set_status(RelayStatus::Disconnected);
                    break;
                }

                if !relay.opts.reconnect {
                    break;
                }

                // Backoff is scheduled only while the relay is desired;
                // otherwise it stays in Failed until the next request.
                if relay.desired.load(Ordering::SeqCst) {
                    let delay: Duration = backoff.next_delay();
                    tracing::debug!(
                        "Reconnecting to '{}' in {} secs",
                        relay.url,
                        delay.as_secs()
                    );

                    let mut rx_service = relay.channels.rx_service().await;
                    tokio::select! {
                        _ = time::sleep(delay) => {}
                        terminate = relay.handle_terminate(&mut rx_service) => {
                            if terminate {
                                relay.set_status(RelayStatus::Disconnected);
                                break;
                            }
                        }
                    }
                } else {
                    // Park until the relay is wanted again
                    let mut rx_service = relay.channels.rx_service().await;
                    if relay.wait_for_wakeup(&mut rx_service).await {
                        relay.set_status(RelayStatus::Disconnected);
                        break;
                    }
                }
            }

            relay.running.store(false, Ordering::SeqCst);
            tracing::debug!(url = %relay.url, "Connection loop terminated.");
        });
    }

    fn termination_requested(&self) -> bool {
        matches!(
            *self.channels.service.0.borrow(),
            RelayServiceEvent::Terminate
        )
    }

    /// Returns `true` when the loop must exit
    async fn handle_terminate(&self, rx_service: &mut watch::Receiver<RelayServiceEvent>) -> bool {
        loop {
            if rx_service.changed().await.is_err() {
                return true;
            }
            match *rx_service.borrow_and_update() {
                RelayServiceEvent::None | RelayServiceEvent::Connect => {}
                RelayServiceEvent::Interrupt => return false,
                RelayServiceEvent::Terminate => return true,
            }
        }
    }

    /// Park until a `Connect` wakeup. Returns `true` on terminate.
    async fn wait_for_wakeup(&self, rx_service: &mut watch::Receiver<RelayServiceEvent>) -> bool {
        loop {
            if rx_service.changed().await.is_err() {
                return true;
            }
            match *rx_service.borrow_and_update() {
                RelayServiceEvent::Connect => return false,
                RelayServiceEvent::Terminate => return true,
                RelayServiceEvent::None | RelayServiceEvent::Interrupt => {}
            }
        }
    }

    /// One connection attempt plus message handling.
    ///
    /// Returns `true` when the session ended with an explicit disconnect.
    async fn connect_and_run(&self, backoff: &mut Backoff) -> bool {
        self.set_status(RelayStatus::Connecting);
        self.stats.new_attempt();

        let url = self.url.to_url();
        let started: Instant = Instant::now();

        match wsocket_connect(&url, &ConnectionMode::Direct, self.opts.connection_timeout).await {
            Ok((ws_tx, ws_rx)) => {
                self.stats.save_latency(started.elapsed());
                self.stats.new_success();
                backoff.reset();
                self.set_status(RelayStatus::Connected);

                if self.opts.fetch_information_document {
                    self.request_information_document();
                }

                if let Err(e) = self.resubscribe().await {
                    tracing::error!("Impossible to subscribe to '{}': {e}", self.url);
                }

                if self.run_message_handlers(ws_tx, ws_rx).await {
                    return true;
                }

                self.set_status(RelayStatus::Failed);
                false
            }
            Err(e) => {
                {
                    let mut last_error = self.last_error.write().await;
                    *last_error = Some(e.to_string());
                }
                self.set_status(RelayStatus::Failed);
                tracing::error!("Impossible to connect to '{}': {e}", self.url);

                // A terminate may have arrived during the attempt
                self.termination_requested()
            }
        }
    }

    /// Returns `true` when the session ended with an explicit disconnect
    async fn run_message_handlers(&self, ws_tx: Sink, ws_rx: Stream) -> bool {
        let mut rx_service = self.channels.rx_service().await;

        tokio::select! {
            res = self.sender_message_handler(ws_tx) => {
                if let Err(e) = res {
                    tracing::error!(url = %self.url, error = %e, "Relay sender exited with error.");
                }
                false
            }
            _ = self.receiver_message_handler(ws_rx) => {
                tracing::trace!(url = %self.url, "Relay receiver exited.");
                false
            }
            terminate = self.handle_terminate(&mut rx_service) => {
                if terminate {
                    self.set_status(RelayStatus::Disconnecting);
                }
                terminate
            }
        }
    }

    async fn sender_message_handler(&self, mut ws_tx: Sink) -> Result<(), Error> {
        let mut rx_nostr = self.channels.rx_nostr().await;

        while let Some(msg) = rx_nostr.recv().await {
            let json: String = msg.as_json();
            let size: usize = json.len();

            tracing::trace!("Sending '{json}' to '{}' (size: {size} bytes)", self.url);

            ws_tx
                .send(WsMessage::Text(json))
                .await
                .map_err(|_| Error::SendFailed)?;

            self.stats.add_bytes_sent(size);
        }

        let _ = ws_tx.close().await;
        Ok(())
    }

    async fn receiver_message_handler(&self, mut ws_rx: Stream) {
        while let Some(msg) = ws_rx.next().await {
            match msg {
                Ok(WsMessage::Text(text)) => {
                    self.handle_raw_message(text.as_bytes()).await;
                }
                Ok(WsMessage::Binary(data)) => {
                    self.handle_raw_message(&data).await;
                }
                Ok(..) => {
                    // Control frames are handled by the transport
                }
                Err(e) => {
                    tracing::error!("WebSocket error for '{}': {e}", self.url);
                    break;
                }
            }
        }
    }

    /// Parse failures are counted and logged, never fatal to the read loop.
    #[tracing::instrument(skip_all, level = "trace")]
    async fn handle_raw_message(&self, data: &[u8]) {
        let size: usize = data.len();
        self.stats.add_bytes_received(size);

        if let Some(max_size) = self.opts.limits.max_message_size {
            if size > max_size as usize {
                self.stats.new_parse_error();
                tracing::warn!(
                    "Ignoring message from '{}': size {size} exceeds limit {max_size}",
                    self.url
                );
                return;
            }
        }

        let message: RelayMessage = match RelayMessage::from_json(data) {
            Ok(message) => message,
            Err(e) => {
                self.stats.new_parse_error();
                tracing::warn!("Impossible to handle message from '{}': {e}", self.url);
                return;
            }
        };

        let message: Option<RelayMessage> = self.preprocess_message(message).await;
        if let Some(message) = message {
            let _ = self.notifications.send(RelayNotification::Message {
                message: message.clone(),
            });
            let _ = self.to_pool.send((self.url.clone(), message)).await;
        }
    }

    /// Per-message checks before routing. Returns `None` to drop.
    async fn preprocess_message(&self, message: RelayMessage) -> Option<RelayMessage> {
        match message {
            RelayMessage::Event {
                subscription_id,
                event,
            } => {
                let event: Box<Event> = self.check_event(event).await?;
                Some(RelayMessage::Event {
                    subscription_id,
                    event,
                })
            }
            RelayMessage::Auth { challenge } => {
                tracing::debug!(
                    "Received '{challenge}' authentication challenge from '{}'",
                    self.url
                );
                let mut slot = self.challenge.write().await;
                *slot = Some(challenge.clone());
                Some(RelayMessage::Auth { challenge })
            }
            RelayMessage::Closed {
                subscription_id,
                message,
            } => {
                tracing::debug!(
                    "Subscription '{subscription_id}' closed by '{}': {message}",
                    self.url
                );
                self.subscription_closed(&subscription_id).await;
                Some(RelayMessage::Closed {
                    subscription_id,
                    message,
                })
            }
            RelayMessage::Notice { message } => {
                tracing::warn!("Notice from '{}': {message}", self.url);
                Some(RelayMessage::Notice { message })
            }
            m => Some(m),
        }
    }

    async fn check_event(&self, event: Box<Event>) -> Option<Box<Event>> {
        if let Some(max_size) = self.opts.limits.max_event_size {
            let size: usize = event.as_json().len();
            if size > max_size as usize {
                tracing::warn!(
                    "Dropping event {} from '{}': size {size} exceeds limit {max_size}",
                    event.id,
                    self.url
                );
                return None;
            }
        }

        if event.is_expired() {
            tracing::debug!("Dropping expired event {} from '{}'", event.id, self.url);
            return None;
        }

        match self.sampler.decide() {
            SamplerDecision::Drop => {
                tracing::debug!("Dropping event from untrusted relay '{}'", self.url);
                None
            }
            SamplerDecision::Skip => Some(event),
            SamplerDecision::Verify => {
                self.stats.new_signature_verified();
                match event.verify() {
                    Ok(()) => {
                        self.sampler.record_valid();
                        Some(event)
                    }
                    Err(e) => {
                        self.sampler.record_invalid();
                        self.stats.new_signature_invalid();
                        tracing::warn!(
                            "Invalid signature on event {} from '{}': {e}",
                            event.id,
                            self.url
                        );
                        None
                    }
                }
            }
        }
    }

    fn request_information_document(&self) {
        let now: u64 = Timestamp::now().as_u64();

        if self.last_document_fetch.load(Ordering::SeqCst) + NIP11_REFRESH_INTERVAL >= now {
            return;
        }
        self.last_document_fetch.store(now, Ordering::SeqCst);

        let url = self.url.clone();
        let slot = self.document.clone();
        task::spawn(async move {
            match RelayInformationDocument::get(&url).await {
                Ok(document) => {
                    let mut slot = slot.write().await;
                    *slot = document;
                }
                Err(e) => {
                    tracing::warn!("Can't get information document from '{url}': {e}");
                }
            }
        });
    }

    async fn subscription_closed(&self, id: &SubscriptionId) {
        let mut subscriptions = self.subscriptions.write().await;
        if let Some(data) = subscriptions.get_mut(id) {
            data.closed = true;
        }
    }

    /// Replay pending REQs for the current websocket session
    async fn resubscribe(&self) -> Result<(), Error> {
        let subscriptions = self.subscriptions().await;
        for (id, filters) in subscriptions.into_iter() {
            if !filters.is_empty() {
                self.send_msg(ClientMessage::req(id, filters)).await?;
            }
        }
        Ok(())
    }

    /// Queue a message for the relay.
    ///
    /// Fails with [`Error::NotConnected`] when the relay is not connected and
    /// with [`Error::QueueFull`] on outbound queue overflow. An overflow also
    /// drops the current session, forcing a reconnect.
    pub(crate) async fn send_msg(&self, msg: ClientMessage) -> Result<(), Error> {
        // Track relay-level subscription state first: a REQ issued while
        // offline is replayed on the next (re)connect
        match &msg {
            ClientMessage::Req {
                subscription_id,
                filters,
            } => {
                let mut subscriptions = self.subscriptions.write().await;
                let data: &mut SubscriptionData =
                    subscriptions.entry(subscription_id.clone()).or_default();
                data.filters = filters.clone();
                data.subscribed_at = Timestamp::now();
                data.closed = false;
            }
            ClientMessage::Close(subscription_id) => {
                let mut subscriptions = self.subscriptions.write().await;
                subscriptions.remove(subscription_id);
            }
            _ => {}
        }

        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        match self.channels.try_send_nostr(msg) {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!("Outbound queue full for '{}', dropping session", self.url);
                let _ = self.channels.send_service(RelayServiceEvent::Interrupt);
                Err(e)
            }
        }
    }

    /// Wait until the relay is connected, up to `timeout`
    pub(crate) async fn wait_for_connection(&self, timeout: Duration) {
        if self.is_connected() {
            return;
        }

        let mut notifications = self.notifications.subscribe();
        let _ = time::timeout(Some(timeout), async {
            while let Ok(notification) = notifications.recv().await {
                if let RelayNotification::StatusChanged {
                    status: RelayStatus::Connected,
                } = notification
                {
                    break;
                }
            }
        })
        .await;
    }

    /// Send an event and wait for the matching `OK`
    pub(crate) async fn send_event_wait(
        &self,
        event: Event,
        timeout: Duration,
    ) -> Result<(bool, String), Error> {
        let id: EventId = event.id;
        let mut notifications = self.notifications.subscribe();
        self.send_msg(ClientMessage::event(event)).await?;
        self.wait_for_ok(&mut notifications, id, timeout).await
    }

    /// Authenticate with a NIP42 event and wait for the `OK`
    pub(crate) async fn auth(&self, event: Event) -> Result<(), Error> {
        if event.kind != Kind::AUTHENTICATION {
            return Err(Error::UnexpectedKind {
                expected: Kind::AUTHENTICATION,
                found: event.kind,
            });
        }

        let id: EventId = event.id;
        let mut notifications = self.notifications.subscribe();
        self.send_msg(ClientMessage::auth(event)).await?;

        let (status, message) = self
            .wait_for_ok(&mut notifications, id, WAIT_FOR_OK_TIMEOUT)
            .await?;

        if status {
            let _ = self.notifications.send(RelayNotification::Authenticated);
            Ok(())
        } else {
            Err(Error::RelayMessage(message))
        }
    }

    async fn wait_for_ok(
        &self,
        notifications: &mut broadcast::Receiver<RelayNotification>,
        id: EventId,
        timeout: Duration,
    ) -> Result<(bool, String), Error> {
        time::timeout(Some(timeout), async {
            while let Ok(notification) = notifications.recv().await {
                match notification {
                    RelayNotification::Message {
                        message:
                            RelayMessage::Ok {
                                event_id,
                                status,
                                message,
                            },
                    } => {
                        if event_id == id {
                            return Ok((status, message));
                        }
                    }
                    RelayNotification::StatusChanged { status } => {
                        if !status.is_connected() {
                            return Err(Error::NotConnected);
                        }
                    }
                    RelayNotification::Shutdown => return Err(Error::Shutdown),
                    _ => {}
                }
            }
            Err(Error::Shutdown)
        })
        .await
        .ok_or(Error::Timeout)?
    }

    /// Disconnect and stop the connection loop
    pub(crate) fn disconnect(&self) -> Result<(), Error> {
        self.desired.store(false, Ordering::SeqCst);
        if self.running.load(Ordering::SeqCst) {
            self.channels.send_service(RelayServiceEvent::Terminate)?;
            let _ = self.notifications.send(RelayNotification::Shutdown);
        }
        Ok(())
    }
}
