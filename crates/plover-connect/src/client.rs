// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Bunker client

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use async_utility::time;
use plover::nips::nip46::{BunkerUri, Message, Request, ResponseResult};
use plover::nips::{nip04, nip44};
use plover::{
    Event, EventBuilder, Filter, Keys, Kind, PublicKey, SecretKey, Signer, SignerBackend,
    SignerError, Tag, UnsignedEvent,
};
use plover_pool::pool::{PoolNotification, PublishOptions};
use plover_pool::{RelayOptions, RelayPool, SubscriptionOptions};
use tokio::sync::broadcast::Receiver;
use tokio::sync::{Mutex, OnceCell};
use url::Url;

use crate::error::Error;

/// Default bunker RPC timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Handler invoked when the bunker asks the user to visit an `auth_url`
#[async_trait]
pub trait AuthUrlHandler: fmt::Debug + Send + Sync {
    /// Surface the auth URL to the user.
    ///
    /// The pending request stays blocked until the RPC id completes or times
    /// out.
    async fn on_auth_url(&self, auth_url: Url) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Remote bunker signer (NIP46).
///
/// Talks to a remote signer over Nostr itself: requests are encrypted to the
/// bunker's pubkey and published as ephemeral kind 24133 events on the
/// bunker's relay set.
#[derive(Debug, Clone)]
pub struct BunkerClient {
    uri: BunkerUri,
    app_keys: Keys,
    user_public_key: Arc<OnceCell<PublicKey>>,
    pool: RelayPool,
    timeout: Duration,
    opts: RelayOptions,
    bootstrapped: Arc<Mutex<bool>>,
    auth_url_handler: Option<Arc<dyn AuthUrlHandler>>,
}

impl BunkerClient {
    /// New bunker client from a `bunker://` URI.
    ///
    /// `app_keys` identify this client to the bunker; they are NOT the user's
    /// signing keys.
    pub fn new(uri: BunkerUri, app_keys: Keys, timeout: Duration, opts: RelayOptions) -> Self {
        Self {
            uri,
            app_keys,
            user_public_key: Arc::new(OnceCell::new()),
            pool: RelayPool::default(),
            timeout,
            opts,
            bootstrapped: Arc::new(Mutex::new(false)),
            auth_url_handler: None,
        }
    }

    /// Set an `auth_url` handler
    pub fn auth_url_handler<T>(mut self, handler: T) -> Self
    where
        T: AuthUrlHandler + 'static,
    {
        self.auth_url_handler = Some(Arc::new(handler));
        self
    }

    /// Local app keys
    #[inline]
    pub fn local_keys(&self) -> &Keys {
        &self.app_keys
    }

    /// Remote signer public key
    #[inline]
    pub fn remote_signer_public_key(&self) -> &PublicKey {
        &self.uri.remote_signer_public_key
    }

    /// Connect to the bunker relays, subscribe to responses and send the
    /// `connect` RPC. Idempotent.
    pub async fn bootstrap(&self) -> Result<(), Error> {
        let mut bootstrapped = self.bootstrapped.lock().await;
        if *bootstrapped {
            return Ok(());
        }

        for url in self.uri.relays.iter() {
            self.pool
                .add_relay(url.clone(), self.opts.clone())
                .await?;
        }
        self.pool.connect().await;

        // Keep a relay-side subscription open for responses addressed to us
        let filter: Filter = Filter::new()
            .pubkey(self.app_keys.public_key())
            .kind(Kind::NOSTR_CONNECT)
            .limit(0);
        let mut handle = self
            .pool
            .subscribe(vec![filter], SubscriptionOptions::default())
            .await?;
        tokio::spawn(async move {
            // Responses are consumed via pool notifications; drain the handle
            // so its buffer never pauses
            while handle.recv().await.is_some() {}
        });

        // The `connect` ack confirms the bunker accepted us
        let result: ResponseResult = self
            .send_request(Request::Connect {
                public_key: self.uri.remote_signer_public_key,
                secret: self.uri.secret.clone(),
            })
            .await?;
        match result {
            ResponseResult::Ack => {
                *bootstrapped = true;
                Ok(())
            }
            _ => Err(Error::UnexpectedResponse { expected: "ack" }),
        }
    }

    async fn ensure_bootstrapped(&self) -> Result<(), Error> {
        self.bootstrap().await
    }

    /// Decrypt a kind 24133 payload: NIP04 payloads carry the legacy
    /// `?iv=` marker, everything else is NIP44
    fn decrypt(&self, sender: &PublicKey, content: &str) -> Result<String, Error> {
        let secret_key: &SecretKey = self.app_keys.secret_key();
        if content.contains("?iv=") {
            Ok(nip04::decrypt(secret_key, sender, content)?)
        } else {
            Ok(nip44::decrypt(secret_key, sender, content)?)
        }
    }

    /// Send an RPC request and await the matching response
    async fn send_request(&self, req: Request) -> Result<ResponseResult, Error> {
        let msg: Message = Message::request(req);
        let req_id: String = msg.id().to_string();

        // Listen before publishing so the response can't be missed
        let notifications: Receiver<PoolNotification> = self.pool.notifications();

        let content: String = nip04::encrypt(
            self.app_keys.secret_key(),
            &self.uri.remote_signer_public_key,
            msg.as_json(),
        )?;
        let event: Event = EventBuilder::new(Kind::NOSTR_CONNECT, content)
            .tag(Tag::public_key(self.uri.remote_signer_public_key))
            .sign_with_keys(&self.app_keys)?;

        self.pool
            .publish(event, PublishOptions::default())
            .await?;

        self.await_response(req_id, notifications).await
    }

    async fn await_response(
        &self,
        req_id: String,
        mut notifications: Receiver<PoolNotification>,
    ) -> Result<ResponseResult, Error> {
        time::timeout(Some(self.timeout), async move {
            loop {
                let notification = notifications
                    .recv()
                    .await
                    .map_err(|_| Error::Shutdown)?;

                let event: Box<Event> = match notification {
                    PoolNotification::Event { event, .. } => event,
                    PoolNotification::Shutdown => return Err(Error::Shutdown),
                    _ => continue,
                };

                if event.kind != Kind::NOSTR_CONNECT
                    || event.pubkey != self.uri.remote_signer_public_key
                {
                    continue;
                }

                let decrypted: String = match self.decrypt(&event.pubkey, &event.content) {
                    Ok(decrypted) => decrypted,
                    Err(e) => {
                        tracing::warn!("Impossible to decrypt bunker response: {e}");
                        continue;
                    }
                };

                let message: Message = match Message::from_json(&decrypted) {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::warn!("Impossible to parse bunker response: {e}");
                        continue;
                    }
                };

                let (id, result, error) = match message {
                    Message::Response { id, result, error } => (id, result, error),
                    Message::Request { .. } => continue,
                };

                if id != req_id {
                    continue;
                }

                // The bunker wants user confirmation: surface the URL and
                // keep the request pending until the id completes
                if let Some(ResponseResult::AuthUrl) = result {
                    if let (Some(handler), Some(url)) = (&self.auth_url_handler, &error) {
                        match Url::parse(url) {
                            Ok(url) => {
                                let handler = handler.clone();
                                let url = url.clone();
                                tokio::spawn(async move {
                                    if let Err(e) = handler.on_auth_url(url).await {
                                        tracing::error!("Auth url handler failed: {e}");
                                    }
                                });
                            }
                            Err(e) => tracing::warn!("Invalid auth url: {e}"),
                        }
                    }
                    continue;
                }

                if let Some(error) = error {
                    return Err(Error::BunkerRejected(error));
                }

                match result {
                    Some(result) => return Ok(result),
                    None => return Err(Error::BunkerRejected(String::from("empty response"))),
                }
            }
        })
        .await
        .ok_or(Error::BunkerTimeout)?
    }

    /// Get the user public key, querying the bunker on first use
    pub async fn user_public_key(&self) -> Result<PublicKey, Error> {
        self.ensure_bootstrapped().await?;

        if let Some(public_key) = self.user_public_key.get() {
            return Ok(*public_key);
        }

        let result: ResponseResult = self.send_request(Request::GetPublicKey).await?;
        match result {
            ResponseResult::GetPublicKey(public_key) => {
                let _ = self.user_public_key.set(public_key);
                Ok(public_key)
            }
            _ => Err(Error::UnexpectedResponse {
                expected: "public key",
            }),
        }
    }

    /// Ping the bunker
    pub async fn ping(&self) -> Result<(), Error> {
        self.ensure_bootstrapped().await?;
        match self.send_request(Request::Ping).await? {
            ResponseResult::Pong => Ok(()),
            _ => Err(Error::UnexpectedResponse { expected: "pong" }),
        }
    }

    async fn rpc_sign_event(&self, unsigned: UnsignedEvent) -> Result<Event, Error> {
        self.ensure_bootstrapped().await?;
        match self
            .send_request(Request::SignEvent(Box::new(unsigned)))
            .await?
        {
            ResponseResult::SignEvent(event) => Ok(*event),
            _ => Err(Error::UnexpectedResponse {
                expected: "signed event",
            }),
        }
    }

    async fn rpc_cipher(&self, req: Request) -> Result<String, Error> {
        self.ensure_bootstrapped().await?;
        match self.send_request(req).await? {
            ResponseResult::Cipher(payload) => Ok(payload),
            _ => Err(Error::UnexpectedResponse { expected: "payload" }),
        }
    }
}

#[async_trait]
impl Signer for BunkerClient {
    fn backend(&self) -> SignerBackend {
        SignerBackend::Bunker
    }

    async fn get_public_key(&self) -> Result<PublicKey, SignerError> {
        self.user_public_key().await.map_err(SignerError::backend)
    }

    async fn sign_event(&self, unsigned: UnsignedEvent) -> Result<Event, SignerError> {
        self.rpc_sign_event(unsigned)
            .await
            .map_err(SignerError::backend)
    }

    async fn nip04_encrypt(
        &self,
        public_key: &PublicKey,
        content: &str,
    ) -> Result<String, SignerError> {
        self.rpc_cipher(Request::Nip04Encrypt {
            public_key: *public_key,
            text: content.to_string(),
        })
        .await
        .map_err(SignerError::backend)
    }

    async fn nip04_decrypt(
        &self,
        public_key: &PublicKey,
        encrypted_content: &str,
    ) -> Result<String, SignerError> {
        self.rpc_cipher(Request::Nip04Decrypt {
            public_key: *public_key,
            ciphertext: encrypted_content.to_string(),
        })
        .await
        .map_err(SignerError::backend)
    }

    async fn nip44_encrypt(
        &self,
        public_key: &PublicKey,
        content: &str,
    ) -> Result<String, SignerError> {
        self.rpc_cipher(Request::Nip44Encrypt {
            public_key: *public_key,
            text: content.to_string(),
        })
        .await
        .map_err(SignerError::backend)
    }

    async fn nip44_decrypt(
        &self,
        public_key: &PublicKey,
        payload: &str,
    ) -> Result<String, SignerError> {
        self.rpc_cipher(Request::Nip44Decrypt {
            public_key: *public_key,
            ciphertext: payload.to_string(),
        })
        .await
        .map_err(SignerError::backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_decrypt_dispatch() {
        let app_keys = Keys::generate();
        let remote_keys = Keys::generate();

        let uri = BunkerUri {
            remote_signer_public_key: remote_keys.public_key(),
            relays: vec![plover::RelayUrl::parse("wss://relay.nsec.app").unwrap()],
            secret: None,
        };
        let client = BunkerClient::new(
            uri,
            app_keys.clone(),
            DEFAULT_TIMEOUT,
            RelayOptions::default(),
        );

        let nip04_payload =
            nip04::encrypt(remote_keys.secret_key(), &app_keys.public_key(), "legacy").unwrap();
        assert_eq!(
            client
                .decrypt(&remote_keys.public_key(), &nip04_payload)
                .unwrap(),
            "legacy"
        );

        let nip44_payload =
            nip44::encrypt(remote_keys.secret_key(), &app_keys.public_key(), "modern").unwrap();
        assert_eq!(
            client
                .decrypt(&remote_keys.public_key(), &nip44_payload)
                .unwrap(),
            "modern"
        );
    }
}
