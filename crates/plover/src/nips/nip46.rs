// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! NIP46: Nostr Remote Signing
//!
//! <https://github.com/nostr-protocol/nips/blob/master/46.md>

use core::fmt;
use core::str::FromStr;

use secp256k1::rand::{self, Rng};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::event::unsigned;
use crate::key::PublicKey;
use crate::types::url::RelayUrl;
use crate::util::JsonUtil;
use crate::{Event, UnsignedEvent};

/// NIP46 error
#[derive(Debug)]
pub enum Error {
    /// Json error
    Json(serde_json::Error),
    /// Key error
    Key(crate::key::Error),
    /// Unsigned event error
    Unsigned(unsigned::Error),
    /// Event error
    Event(crate::event::Error),
    /// Url parse error
    Url(url::ParseError),
    /// Unknown method
    UnknownMethod(String),
    /// Invalid request
    InvalidRequest,
    /// Invalid params length
    InvalidParamsLength,
    /// Invalid bunker URI
    InvalidUri,
    /// Response error message
    Response(String),
    /// Unexpected result
    UnexpectedResult,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(e) => write!(f, "Json: {e}"),
            Self::Key(e) => write!(f, "Key: {e}"),
            Self::Unsigned(e) => write!(f, "Unsigned event: {e}"),
            Self::Event(e) => write!(f, "Event: {e}"),
            Self::Url(e) => write!(f, "Url: {e}"),
            Self::UnknownMethod(m) => write!(f, "Unknown method: {m}"),
            Self::InvalidRequest => write!(f, "Invalid request"),
            Self::InvalidParamsLength => write!(f, "Invalid params length"),
            Self::InvalidUri => write!(f, "Invalid bunker URI"),
            Self::Response(e) => write!(f, "Response error: {e}"),
            Self::UnexpectedResult => write!(f, "Unexpected result"),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<crate::key::Error> for Error {
    fn from(e: crate::key::Error) -> Self {
        Self::Key(e)
    }
}

impl From<unsigned::Error> for Error {
    fn from(e: unsigned::Error) -> Self {
        Self::Unsigned(e)
    }
}

impl From<crate::event::Error> for Error {
    fn from(e: crate::event::Error) -> Self {
        Self::Event(e)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Self::Url(e)
    }
}

/// RPC method
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Method {
    /// Connect
    Connect,
    /// Get public key
    GetPublicKey,
    /// Sign event
    SignEvent,
    /// Ping
    Ping,
    /// NIP04 encrypt
    Nip04Encrypt,
    /// NIP04 decrypt
    Nip04Decrypt,
    /// NIP44 encrypt
    Nip44Encrypt,
    /// NIP44 decrypt
    Nip44Decrypt,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::GetPublicKey => write!(f, "get_public_key"),
            Self::SignEvent => write!(f, "sign_event"),
            Self::Ping => write!(f, "ping"),
            Self::Nip04Encrypt => write!(f, "nip04_encrypt"),
            Self::Nip04Decrypt => write!(f, "nip04_decrypt"),
            Self::Nip44Encrypt => write!(f, "nip44_encrypt"),
            Self::Nip44Decrypt => write!(f, "nip44_decrypt"),
        }
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connect" => Ok(Self::Connect),
            "get_public_key" => Ok(Self::GetPublicKey),
            "sign_event" => Ok(Self::SignEvent),
            "ping" => Ok(Self::Ping),
            "nip04_encrypt" => Ok(Self::Nip04Encrypt),
            "nip04_decrypt" => Ok(Self::Nip04Decrypt),
            "nip44_encrypt" => Ok(Self::Nip44Encrypt),
            "nip44_decrypt" => Ok(Self::Nip44Decrypt),
            other => Err(Error::UnknownMethod(other.to_string())),
        }
    }
}

/// RPC request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Connect
    Connect {
        /// Remote signer public key
        public_key: PublicKey,
        /// Optional secret
        secret: Option<String>,
    },
    /// Get public key of the signing user
    GetPublicKey,
    /// Sign an [`UnsignedEvent`]
    SignEvent(Box<UnsignedEvent>),
    /// Ping
    Ping,
    /// NIP04 encrypt
    Nip04Encrypt {
        /// Counterparty
        public_key: PublicKey,
        /// Plaintext
        text: String,
    },
    /// NIP04 decrypt
    Nip04Decrypt {
        /// Counterparty
        public_key: PublicKey,
        /// Ciphertext
        ciphertext: String,
    },
    /// NIP44 encrypt
    Nip44Encrypt {
        /// Counterparty
        public_key: PublicKey,
        /// Plaintext
        text: String,
    },
    /// NIP44 decrypt
    Nip44Decrypt {
        /// Counterparty
        public_key: PublicKey,
        /// Ciphertext
        ciphertext: String,
    },
}

impl Request {
    /// Compose [`Request`] from method and params
    pub fn from_message(method: Method, params: Vec<String>) -> Result<Self, Error> {
        match method {
            Method::Connect => {
                let public_key: &String = params.first().ok_or(Error::InvalidRequest)?;
                let public_key: PublicKey = PublicKey::from_hex(public_key)?;
                let secret: Option<String> = params.get(1).cloned();
                Ok(Self::Connect { public_key, secret })
            }
            Method::GetPublicKey => Ok(Self::GetPublicKey),
            Method::SignEvent => {
                let unsigned: &String = params.first().ok_or(Error::InvalidRequest)?;
                let unsigned: UnsignedEvent = UnsignedEvent::from_json(unsigned)?;
                Ok(Self::SignEvent(Box::new(unsigned)))
            }
            Method::Ping => Ok(Self::Ping),
            Method::Nip04Encrypt | Method::Nip44Encrypt => {
                if params.len() != 2 {
                    return Err(Error::InvalidParamsLength);
                }
                let public_key: PublicKey = PublicKey::from_hex(&params[0])?;
                let text: String = params[1].clone();
                if method == Method::Nip04Encrypt {
                    Ok(Self::Nip04Encrypt { public_key, text })
                } else {
                    Ok(Self::Nip44Encrypt { public_key, text })
                }
            }
            Method::Nip04Decrypt | Method::Nip44Decrypt => {
                if params.len() != 2 {
                    return Err(Error::InvalidParamsLength);
                }
                let public_key: PublicKey = PublicKey::from_hex(&params[0])?;
                let ciphertext: String = params[1].clone();
                if method == Method::Nip04Decrypt {
                    Ok(Self::Nip04Decrypt {
                        public_key,
                        ciphertext,
                    })
                } else {
                    Ok(Self::Nip44Decrypt {
                        public_key,
                        ciphertext,
                    })
                }
            }
        }
    }

    /// Get request method
    pub fn method(&self) -> Method {
        match self {
            Self::Connect { .. } => Method::Connect,
            Self::GetPublicKey => Method::GetPublicKey,
            Self::SignEvent(..) => Method::SignEvent,
            Self::Ping => Method::Ping,
            Self::Nip04Encrypt { .. } => Method::Nip04Encrypt,
            Self::Nip04Decrypt { .. } => Method::Nip04Decrypt,
            Self::Nip44Encrypt { .. } => Method::Nip44Encrypt,
            Self::Nip44Decrypt { .. } => Method::Nip44Decrypt,
        }
    }

    /// Get request params
    pub fn params(&self) -> Vec<String> {
        match self {
            Self::Connect { public_key, secret } => {
                let mut params = vec![public_key.to_hex()];
                if let Some(secret) = secret {
                    params.push(secret.clone());
                }
                params
            }
            Self::GetPublicKey | Self::Ping => Vec::new(),
            Self::SignEvent(unsigned) => vec![unsigned.as_json()],
            Self::Nip04Encrypt { public_key, text } | Self::Nip44Encrypt { public_key, text } => {
                vec![public_key.to_hex(), text.clone()]
            }
            Self::Nip04Decrypt {
                public_key,
                ciphertext,
            }
            | Self::Nip44Decrypt {
                public_key,
                ciphertext,
            } => vec![public_key.to_hex(), ciphertext.clone()],
        }
    }
}

/// RPC response result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseResult {
    /// Ack (connect)
    Ack,
    /// Pong
    Pong,
    /// Auth challenge: the URL is in the `error` field
    AuthUrl,
    /// Public key
    GetPublicKey(PublicKey),
    /// Signed event
    SignEvent(Box<Event>),
    /// Encryption/decryption output
    Cipher(String),
}

impl fmt::Display for ResponseResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ack => write!(f, "ack"),
            Self::Pong => write!(f, "pong"),
            Self::AuthUrl => write!(f, "auth_url"),
            Self::GetPublicKey(public_key) => write!(f, "{public_key}"),
            Self::SignEvent(event) => write!(f, "{}", event.as_json()),
            Self::Cipher(payload) => write!(f, "{payload}"),
        }
    }
}

impl ResponseResult {
    /// Parse a result string
    pub fn parse<S>(result: S) -> Self
    where
        S: AsRef<str>,
    {
        let result: &str = result.as_ref();
        match result {
            "ack" => Self::Ack,
            "pong" => Self::Pong,
            "auth_url" => Self::AuthUrl,
            other => {
                if let Ok(public_key) = PublicKey::from_hex(other) {
                    Self::GetPublicKey(public_key)
                } else if let Ok(event) = Event::from_json(other) {
                    Self::SignEvent(Box::new(event))
                } else {
                    Self::Cipher(other.to_string())
                }
            }
        }
    }
}

#[derive(Serialize, Deserialize)]
struct MessageIntermediate {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// RPC message exchanged over kind 24133 events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Request
    Request {
        /// Request id
        id: String,
        /// Request
        req: Request,
    },
    /// Response
    Response {
        /// Request id
        id: String,
        /// Result
        result: Option<ResponseResult>,
        /// Error
        error: Option<String>,
    },
}

impl Message {
    /// Compose a request with a random id
    pub fn request(req: Request) -> Self {
        let mut rng = rand::thread_rng();
        let id: u32 = rng.gen();
        Self::Request {
            id: id.to_string(),
            req,
        }
    }

    /// Compose a successful response
    pub fn response<S>(id: S, result: ResponseResult) -> Self
    where
        S: Into<String>,
    {
        Self::Response {
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Compose an error response
    pub fn error<S, E>(id: S, error: E) -> Self
    where
        S: Into<String>,
        E: Into<String>,
    {
        Self::Response {
            id: id.into(),
            result: None,
            error: Some(error.into()),
        }
    }

    /// Get the message id
    pub fn id(&self) -> &str {
        match self {
            Self::Request { id, .. } => id,
            Self::Response { id, .. } => id,
        }
    }

    /// Serialize as JSON string
    pub fn as_json(&self) -> String {
        let intermediate: MessageIntermediate = match self {
            Self::Request { id, req } => MessageIntermediate {
                id: id.clone(),
                method: Some(req.method().to_string()),
                params: Some(req.params()),
                result: None,
                error: None,
            },
            Self::Response { id, result, error } => MessageIntermediate {
                id: id.clone(),
                method: None,
                params: None,
                result: result.as_ref().map(|r| r.to_string()),
                error: error.clone(),
            },
        };
        // Serialization of protocol types can't fail
        serde_json::to_string(&intermediate).expect("valid JSON")
    }

    /// Deserialize from JSON string
    pub fn from_json<S>(json: S) -> Result<Self, Error>
    where
        S: AsRef<[u8]>,
    {
        let intermediate: MessageIntermediate = serde_json::from_slice(json.as_ref())?;

        match (intermediate.method, intermediate.params) {
            (Some(method), Some(params)) => {
                let method: Method = Method::from_str(&method)?;
                Ok(Self::Request {
                    id: intermediate.id,
                    req: Request::from_message(method, params)?,
                })
            }
            _ => Ok(Self::Response {
                id: intermediate.id,
                result: intermediate.result.map(ResponseResult::parse),
                error: intermediate.error,
            }),
        }
    }
}

/// Bunker connection URI: `bunker://<hex-pubkey>?relay=<url>&secret=<string>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BunkerUri {
    /// Remote signer public key
    pub remote_signer_public_key: PublicKey,
    /// Relays on which the bunker listens
    pub relays: Vec<RelayUrl>,
    /// Optional connection secret
    pub secret: Option<String>,
}

impl BunkerUri {
    /// Parse a `bunker://` URI
    pub fn parse<S>(uri: S) -> Result<Self, Error>
    where
        S: AsRef<str>,
    {
        let url: Url = Url::parse(uri.as_ref())?;

        if url.scheme() != "bunker" {
            return Err(Error::InvalidUri);
        }

        let remote_signer_public_key: PublicKey = PublicKey::from_hex(
            url.host_str().ok_or(Error::InvalidUri)?,
        )?;

        let mut relays: Vec<RelayUrl> = Vec::new();
        let mut secret: Option<String> = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "relay" => {
                    if let Ok(relay) = RelayUrl::parse(value.as_ref()) {
                        relays.push(relay);
                    }
                }
                "secret" => secret = Some(value.to_string()),
                _ => {}
            }
        }

        if relays.is_empty() {
            return Err(Error::InvalidUri);
        }

        Ok(Self {
            remote_signer_public_key,
            relays,
            secret,
        })
    }
}

impl fmt::Display for BunkerUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bunker://{}?", self.remote_signer_public_key)?;
        let mut query: Vec<String> = self
            .relays
            .iter()
            .map(|relay| format!("relay={relay}"))
            .collect();
        if let Some(secret) = &self.secret {
            query.push(format!("secret={secret}"));
        }
        write!(f, "{}", query.join("&"))
    }
}

impl FromStr for BunkerUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
