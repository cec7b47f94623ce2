// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay messages

use core::fmt;

use serde_json::Value;

use super::{MessageError, SubscriptionId};
use crate::{Event, EventId};

/// Machine-readable prefixes for `OK` and `CLOSED` relay messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MachineReadablePrefix {
    /// Duplicate
    Duplicate,
    /// POW
    Pow,
    /// Blocked
    Blocked,
    /// Rate limited
    RateLimited,
    /// Invalid
    Invalid,
    /// Error
    Error,
    /// Authentication required (NIP42)
    AuthRequired,
    /// Restricted (NIP42)
    Restricted,
}

impl fmt::Display for MachineReadablePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duplicate => write!(f, "duplicate"),
            Self::Pow => write!(f, "pow"),
            Self::Blocked => write!(f, "blocked"),
            Self::RateLimited => write!(f, "rate-limited"),
            Self::Invalid => write!(f, "invalid"),
            Self::Error => write!(f, "error"),
            Self::AuthRequired => write!(f, "auth-required"),
            Self::Restricted => write!(f, "restricted"),
        }
    }
}

impl MachineReadablePrefix {
    /// Parse machine-readable prefix
    pub fn parse<S>(message: S) -> Option<Self>
    where
        S: AsRef<str>,
    {
        match message.as_ref() {
            m if m.starts_with("duplicate:") => Some(Self::Duplicate),
            m if m.starts_with("pow:") => Some(Self::Pow),
            m if m.starts_with("blocked:") => Some(Self::Blocked),
            m if m.starts_with("rate-limited:") => Some(Self::RateLimited),
            m if m.starts_with("invalid:") => Some(Self::Invalid),
            m if m.starts_with("error:") => Some(Self::Error),
            m if m.starts_with("auth-required:") => Some(Self::AuthRequired),
            m if m.starts_with("restricted:") => Some(Self::Restricted),
            _ => None,
        }
    }
}

/// Messages sent by relays, received by clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// `["EVENT", <subscription_id>, <event JSON>]`
    Event {
        /// Subscription ID
        subscription_id: SubscriptionId,
        /// Event
        event: Box<Event>,
    },
    /// `["OK", <event_id>, <true|false>, <message>]`
    Ok {
        /// Event ID
        event_id: EventId,
        /// Status
        status: bool,
        /// Message
        message: String,
    },
    /// `["EOSE", <subscription_id>]`
    EndOfStoredEvents(SubscriptionId),
    /// `["NOTICE", <message>]`
    Notice {
        /// Message
        message: String,
    },
    /// `["CLOSED", <subscription_id>, <message>]`
    Closed {
        /// Subscription ID
        subscription_id: SubscriptionId,
        /// Message
        message: String,
    },
    /// `["AUTH", <challenge-string>]` (NIP42)
    Auth {
        /// Challenge
        challenge: String,
    },
    /// `["COUNT", <subscription_id>, {"count": <integer>}]` (NIP45)
    Count {
        /// Subscription ID
        subscription_id: SubscriptionId,
        /// Events count
        count: usize,
    },
}

impl RelayMessage {
    /// Deserialize from a JSON string.
    ///
    /// **This method does NOT verify the event signature!**
    pub fn from_json<T>(json: T) -> Result<Self, MessageError>
    where
        T: AsRef<[u8]>,
    {
        let json: &[u8] = json.as_ref();

        if json.is_empty() {
            return Err(MessageError::EmptyMessage);
        }

        let value: Value = serde_json::from_slice(json)?;
        Self::from_value(value)
    }

    /// Deserialize from [`Value`]
    pub fn from_value(value: Value) -> Result<Self, MessageError> {
        let array: &Vec<Value> = value.as_array().ok_or(MessageError::InvalidFormat)?;

        let discriminator: &str = array
            .first()
            .and_then(|v| v.as_str())
            .ok_or(MessageError::InvalidFormat)?;

        match discriminator {
            "EVENT" => {
                let subscription_id: &str = array
                    .get(1)
                    .and_then(|v| v.as_str())
                    .ok_or(MessageError::InvalidFormat)?;
                let event: Event =
                    serde_json::from_value(array.get(2).ok_or(MessageError::InvalidFormat)?.clone())?;
                Ok(Self::Event {
                    subscription_id: SubscriptionId::new(subscription_id),
                    event: Box::new(event),
                })
            }
            "OK" => {
                let event_id: EventId = EventId::from_hex(
                    array
                        .get(1)
                        .and_then(|v| v.as_str())
                        .ok_or(MessageError::InvalidFormat)?,
                )?;
                let status: bool = array
                    .get(2)
                    .and_then(|v| v.as_bool())
                    .ok_or(MessageError::InvalidFormat)?;
                let message: &str = array
                    .get(3)
                    .and_then(|v| v.as_str())
                    .ok_or(MessageError::InvalidFormat)?;
                Ok(Self::Ok {
                    event_id,
                    status,
                    message: message.to_string(),
                })
            }
            "EOSE" => {
                let subscription_id: &str = array
                    .get(1)
                    .and_then(|v| v.as_str())
                    .ok_or(MessageError::InvalidFormat)?;
                Ok(Self::EndOfStoredEvents(SubscriptionId::new(subscription_id)))
            }
            "NOTICE" => {
                let message: &str = array
                    .get(1)
                    .and_then(|v| v.as_str())
                    .ok_or(MessageError::InvalidFormat)?;
                Ok(Self::Notice {
                    message: message.to_string(),
                })
            }
            "CLOSED" => {
                let subscription_id: &str = array
                    .get(1)
                    .and_then(|v| v.as_str())
                    .ok_or(MessageError::InvalidFormat)?;
                let message: &str = array
                    .get(2)
                    .and_then(|v| v.as_str())
                    .ok_or(MessageError::InvalidFormat)?;
                Ok(Self::Closed {
                    subscription_id: SubscriptionId::new(subscription_id),
                    message: message.to_string(),
                })
            }
            "AUTH" => {
                let challenge: &str = array
                    .get(1)
                    .and_then(|v| v.as_str())
                    .ok_or(MessageError::InvalidFormat)?;
                Ok(Self::Auth {
                    challenge: challenge.to_string(),
                })
            }
            "COUNT" => {
                let subscription_id: &str = array
                    .get(1)
                    .and_then(|v| v.as_str())
                    .ok_or(MessageError::InvalidFormat)?;
                let count: usize = array
                    .get(2)
                    .and_then(|v| v.get("count"))
                    .and_then(|v| v.as_u64())
                    .ok_or(MessageError::InvalidFormat)? as usize;
                Ok(Self::Count {
                    subscription_id: SubscriptionId::new(subscription_id),
                    count,
                })
            }
            other => Err(MessageError::UnknownType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event() {
        let json = r#"["EVENT", "random_string", {"id":"70b10f70c1318967eddf12527799411b1a9780ad9c43858f5e5fcd45486a13a5","pubkey":"379e863e8357163b5bce5d2688dc4f1dcc2d505222fb8d74db600f30535dfdfe","created_at":1612809991,"kind":1,"tags":[],"content":"test","sig":"273a9cd5d11455590f4359500bccb7a89428262b96b3ea87a756b770964472f8c3e87f5d5e64d8d2e859a71462a3f477b554565c4f2f326cb01dd7620db71502"}]"#;
        match RelayMessage::from_json(json).unwrap() {
            RelayMessage::Event {
                subscription_id,
                event,
            } => {
                assert_eq!(subscription_id, SubscriptionId::new("random_string"));
                assert_eq!(event.content, "test");
            }
            other => panic!("wrong message: {other:?}"),
        }
    }

    #[test]
    fn test_parse_invalid_event() {
        // Missing event payload
        assert!(RelayMessage::from_json(r#"["EVENT", "random_string"]"#).is_err());
        // Incomplete event object
        assert!(RelayMessage::from_json(
            r#"["EVENT", "random_string", {"id":"70b10f70c1318967eddf12527799411b1a9780ad9c43858f5e5fcd45486a13a5"}]"#
        )
        .is_err());
    }

    #[test]
    fn test_parse_ok() {
        let json = r#"["OK", "b1a649ebe8b435ec71d3784793f3bbf4b93e64e17568a741aecd4c7ddeafce30", true, "pow: difficulty 25>=24"]"#;
        assert_eq!(
            RelayMessage::from_json(json).unwrap(),
            RelayMessage::Ok {
                event_id: EventId::from_hex(
                    "b1a649ebe8b435ec71d3784793f3bbf4b93e64e17568a741aecd4c7ddeafce30"
                )
                .unwrap(),
                status: true,
                message: String::from("pow: difficulty 25>=24"),
            }
        );
    }

    #[test]
    fn test_parse_invalid_ok() {
        // Missing params
        assert!(RelayMessage::from_json(
            r#"["OK", "b1a649ebe8b435ec71d3784793f3bbf4b93e64e17568a741aecd4c7ddeafce30"]"#
        )
        .is_err());
        // Wrong length event id
        assert!(
            RelayMessage::from_json(r#"["OK", "b1a649ebe8b435ec71d3784793f3bb", true, ""]"#)
                .is_err()
        );
    }

    #[test]
    fn test_parse_eose_notice_closed_auth() {
        assert_eq!(
            RelayMessage::from_json(r#"["EOSE","sub1"]"#).unwrap(),
            RelayMessage::EndOfStoredEvents(SubscriptionId::new("sub1"))
        );
        assert_eq!(
            RelayMessage::from_json(r#"["NOTICE","Invalid event format!"]"#).unwrap(),
            RelayMessage::Notice {
                message: String::from("Invalid event format!")
            }
        );
        assert_eq!(
            RelayMessage::from_json(r#"["CLOSED","sub1","auth-required: we only serve humans"]"#)
                .unwrap(),
            RelayMessage::Closed {
                subscription_id: SubscriptionId::new("sub1"),
                message: String::from("auth-required: we only serve humans"),
            }
        );
        assert_eq!(
            RelayMessage::from_json(r#"["AUTH","challenge-string"]"#).unwrap(),
            RelayMessage::Auth {
                challenge: String::from("challenge-string")
            }
        );
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(
            RelayMessage::from_json(r#"["COUNT","sub1",{"count":42}]"#).unwrap(),
            RelayMessage::Count {
                subscription_id: SubscriptionId::new("sub1"),
                count: 42,
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            RelayMessage::from_json(""),
            Err(MessageError::EmptyMessage)
        );
        assert!(RelayMessage::from_json(r#"{"not":"an array"}"#).is_err());
        assert!(matches!(
            RelayMessage::from_json(r#"["WAT","x"]"#),
            Err(MessageError::UnknownType(..))
        ));
        assert!(RelayMessage::from_json(r#"["EOSE"]"#).is_err());
        assert!(RelayMessage::from_json(r#"["EOSE", 404]"#).is_err());
    }

    #[test]
    fn test_machine_readable_prefix() {
        assert_eq!(
            MachineReadablePrefix::parse("rate-limited: try later"),
            Some(MachineReadablePrefix::RateLimited)
        );
        assert_eq!(
            MachineReadablePrefix::parse("duplicate: already have it"),
            Some(MachineReadablePrefix::Duplicate)
        );
        assert_eq!(MachineReadablePrefix::parse("all good"), None);
    }
}
