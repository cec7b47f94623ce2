// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Client messages

use serde_json::{json, Value};

use super::SubscriptionId;
use crate::{Event, Filter};

/// Messages sent by clients, received by relays
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// `["EVENT", <event JSON>]`
    Event(Box<Event>),
    /// `["REQ", <subscription_id>, <filter JSON>, <filter JSON>, ...]`
    Req {
        /// Subscription ID
        subscription_id: SubscriptionId,
        /// Filters
        filters: Vec<Filter>,
    },
    /// `["CLOSE", <subscription_id>]`
    Close(SubscriptionId),
    /// `["AUTH", <signed event JSON>]` (NIP42)
    Auth(Box<Event>),
    /// `["COUNT", <subscription_id>, <filter JSON>, ...]` (NIP45)
    Count {
        /// Subscription ID
        subscription_id: SubscriptionId,
        /// Filters
        filters: Vec<Filter>,
    },
}

impl ClientMessage {
    /// Compose `EVENT` message
    #[inline]
    pub fn event(event: Event) -> Self {
        Self::Event(Box::new(event))
    }

    /// Compose `REQ` message
    #[inline]
    pub fn req(subscription_id: SubscriptionId, filters: Vec<Filter>) -> Self {
        Self::Req {
            subscription_id,
            filters,
        }
    }

    /// Compose `CLOSE` message
    #[inline]
    pub fn close(subscription_id: SubscriptionId) -> Self {
        Self::Close(subscription_id)
    }

    /// Compose `AUTH` message
    #[inline]
    pub fn auth(event: Event) -> Self {
        Self::Auth(Box::new(event))
    }

    /// Compose `COUNT` message
    #[inline]
    pub fn count(subscription_id: SubscriptionId, filters: Vec<Filter>) -> Self {
        Self::Count {
            subscription_id,
            filters,
        }
    }

    /// Check if is an `EVENT` message
    #[inline]
    pub fn is_event(&self) -> bool {
        matches!(self, Self::Event(..))
    }

    /// Check if is a `REQ` message
    #[inline]
    pub fn is_req(&self) -> bool {
        matches!(self, Self::Req { .. })
    }

    /// Check if is a `CLOSE` message
    #[inline]
    pub fn is_close(&self) -> bool {
        matches!(self, Self::Close(..))
    }

    /// Serialize as [`Value`]
    pub fn as_value(&self) -> Value {
        match self {
            Self::Event(event) => json!(["EVENT", event]),
            Self::Req {
                subscription_id,
                filters,
            } => {
                let mut json = json!(["REQ", subscription_id]);
                let mut filters = json!(filters);
                if let (Some(json), Some(filters)) =
                    (json.as_array_mut(), filters.as_array_mut())
                {
                    json.append(filters);
                }
                json
            }
            Self::Close(subscription_id) => json!(["CLOSE", subscription_id]),
            Self::Auth(event) => json!(["AUTH", event]),
            Self::Count {
                subscription_id,
                filters,
            } => {
                let mut json = json!(["COUNT", subscription_id]);
                let mut filters = json!(filters);
                if let (Some(json), Some(filters)) =
                    (json.as_array_mut(), filters.as_array_mut())
                {
                    json.append(filters);
                }
                json
            }
        }
    }

    /// Serialize as JSON string
    #[inline]
    pub fn as_json(&self) -> String {
        self.as_value().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Kind, PublicKey};

    #[test]
    fn test_req() {
        let pk =
            PublicKey::from_hex("379e863e8357163b5bce5d2688dc4f1dcc2d505222fb8d74db600f30535dfdfe")
                .unwrap();
        let filters = vec![
            Filter::new().kind(Kind::ENCRYPTED_DIRECT_MESSAGE),
            Filter::new().pubkey(pk),
        ];

        let msg = ClientMessage::req(SubscriptionId::new("test"), filters);
        assert_eq!(
            msg.as_json(),
            r##"["REQ","test",{"kinds":[4]},{"#p":["379e863e8357163b5bce5d2688dc4f1dcc2d505222fb8d74db600f30535dfdfe"]}]"##
        );
    }

    #[test]
    fn test_close() {
        let msg = ClientMessage::close(SubscriptionId::new("test"));
        assert_eq!(msg.as_json(), r#"["CLOSE","test"]"#);
    }
}
