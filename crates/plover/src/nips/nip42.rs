// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! NIP42: Authentication of clients to relays
//!
//! <https://github.com/nostr-protocol/nips/blob/master/42.md>

use crate::types::url::RelayUrl;
use crate::{Event, Kind};

/// Check if the [`Event`] is a valid authentication response for the given
/// relay and challenge.
pub fn is_valid_auth_event(event: &Event, relay_url: &RelayUrl, challenge: &str) -> bool {
    if event.kind != Kind::AUTHENTICATION {
        return false;
    }

    let relay_matches: bool = event
        .tags
        .iter()
        .filter(|tag| tag.name() == "relay")
        .filter_map(|tag| tag.content())
        .filter_map(|content| RelayUrl::parse(content).ok())
        .any(|url| &url == relay_url);
    if !relay_matches {
        return false;
    }

    event
        .tags
        .iter()
        .filter(|tag| tag.name() == "challenge")
        .filter_map(|tag| tag.content())
        .any(|c| c == challenge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventBuilder, Keys};

    #[test]
    fn test_valid_auth_event() {
        let keys = Keys::generate();
        let relay_url = RelayUrl::parse("wss://relay.damus.io").unwrap();
        let challenge = "1234567890";

        let event = EventBuilder::auth(challenge, relay_url.clone())
            .sign_with_keys(&keys)
            .unwrap();
        assert!(is_valid_auth_event(&event, &relay_url, challenge));
    }

    #[test]
    fn test_invalid_auth_event() {
        let keys = Keys::generate();
        let relay_url = RelayUrl::parse("wss://relay.damus.io").unwrap();
        let challenge = "1234567890";

        // Wrong challenge
        let event = EventBuilder::auth("abcd", relay_url.clone())
            .sign_with_keys(&keys)
            .unwrap();
        assert!(!is_valid_auth_event(&event, &relay_url, challenge));

        // Wrong relay url
        let event = EventBuilder::auth(challenge, RelayUrl::parse("wss://example.com").unwrap())
            .sign_with_keys(&keys)
            .unwrap();
        assert!(!is_valid_auth_event(&event, &relay_url, challenge));

        // Wrong kind
        let event = EventBuilder::text_note("abcd")
            .sign_with_keys(&keys)
            .unwrap();
        assert!(!is_valid_auth_event(&event, &relay_url, challenge));
    }
}
