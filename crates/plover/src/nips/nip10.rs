// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! NIP10: Text note references
//!
//! <https://github.com/nostr-protocol/nips/blob/master/10.md>

use core::fmt;
use core::str::FromStr;

use crate::event::id::EventId;
use crate::event::tag::Tag;

/// NIP10 error
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// Unknown marker
    UnknownMarker(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownMarker(m) => write!(f, "Unknown marker: {m}"),
        }
    }
}

/// `e` tag marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Marker {
    /// Root of the thread
    Root,
    /// Direct reply target
    Reply,
    /// Mention
    Mention,
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::Reply => write!(f, "reply"),
            Self::Mention => write!(f, "mention"),
        }
    }
}

impl FromStr for Marker {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "root" => Ok(Self::Root),
            "reply" => Ok(Self::Reply),
            "mention" => Ok(Self::Mention),
            m => Err(Error::UnknownMarker(m.to_string())),
        }
    }
}

fn marker_of(tag: &Tag) -> Option<Marker> {
    tag.as_slice().get(3).and_then(|m| Marker::from_str(m).ok())
}

fn event_id_of(tag: &Tag) -> Option<EventId> {
    tag.content().and_then(|c| EventId::from_hex(c).ok())
}

/// Resolve the reply target of a tag list.
///
/// The first `e` tag marked `reply` wins; with no marked tags the positional
/// rules apply: a single `e` tag is the target, otherwise the last one is.
pub fn reply_to(tags: &[Tag]) -> Option<EventId> {
    let e_tags: Vec<&Tag> = tags.iter().filter(|tag| tag.name() == "e").collect();

    // Marked convention
    if let Some(tag) = e_tags.iter().find(|tag| marker_of(tag) == Some(Marker::Reply)) {
        return event_id_of(tag);
    }

    // A root-only thread replies to the root
    if let Some(tag) = e_tags.iter().find(|tag| marker_of(tag) == Some(Marker::Root)) {
        return event_id_of(tag);
    }

    // Positional convention: ignore marked mentions
    let positional: Vec<&&Tag> = e_tags
        .iter()
        .filter(|tag| marker_of(tag).is_none())
        .collect();
    match positional.as_slice() {
        [] => None,
        [single] => event_id_of(single),
        [.., last] => event_id_of(last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "70b10f70c1318967eddf12527799411b1a9780ad9c43858f5e5fcd45486a13a5";
    const REPLY: &str = "7469af3be8c8e06e1b50ef1caceba30392ddc0b6614507398b7d7daa4c218e96";

    fn e(id: &str) -> Tag {
        Tag::parse(["e", id]).unwrap()
    }

    fn e_marked(id: &str, marker: &str) -> Tag {
        Tag::parse(["e", id, "", marker]).unwrap()
    }

    #[test]
    fn test_marked_reply() {
        let tags = vec![e_marked(ROOT, "root"), e_marked(REPLY, "reply")];
        assert_eq!(reply_to(&tags), Some(EventId::from_hex(REPLY).unwrap()));
    }

    #[test]
    fn test_root_only() {
        let tags = vec![e_marked(ROOT, "root")];
        assert_eq!(reply_to(&tags), Some(EventId::from_hex(ROOT).unwrap()));
    }

    #[test]
    fn test_positional_single() {
        let tags = vec![e(ROOT)];
        assert_eq!(reply_to(&tags), Some(EventId::from_hex(ROOT).unwrap()));
    }

    #[test]
    fn test_positional_multiple() {
        let tags = vec![e(ROOT), e(REPLY)];
        assert_eq!(reply_to(&tags), Some(EventId::from_hex(REPLY).unwrap()));
    }

    #[test]
    fn test_mention_ignored() {
        let tags = vec![e_marked(ROOT, "mention")];
        assert_eq!(reply_to(&tags), None);
    }

    #[test]
    fn test_no_e_tags() {
        assert_eq!(reply_to(&[]), None);
    }
}
