// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Content scanning: hashtags and bech32 mentions

use std::collections::HashSet;

use super::Tag;
use crate::nips::nip19::{FromBech32, Nip19};

const NOSTR_URI_SCHEME: &str = "nostr:";

/// Scan `content` for `#hashtag`, `@<bech32>` and `nostr:<bech32>` tokens.
///
/// For every recognized token the matching tag is appended to `tags`
/// (deduplicated against the existing ones) and mentions are rewritten to the
/// canonical `nostr:<bech32>` form. Returns the rewritten content.
pub(crate) fn generate(content: &str, tags: &mut Vec<Tag>) -> String {
    let mut seen: HashSet<Vec<String>> = tags.iter().map(|t| t.as_slice().to_vec()).collect();
    let mut out: String = String::with_capacity(content.len());
    let mut chars = content.char_indices().peekable();
    let mut word_start: Option<usize> = None;
    let mut last_end: usize = 0;

    // Iterate over maximal non-whitespace runs
    while let Some((idx, c)) = chars.next() {
        if !c.is_whitespace() {
            if word_start.is_none() {
                word_start = Some(idx);
            }
        }

        let at_end: bool = chars.peek().is_none();
        let boundary: bool = c.is_whitespace() || at_end;

        if boundary {
            if let Some(start) = word_start.take() {
                let end: usize = if c.is_whitespace() {
                    idx
                } else {
                    idx + c.len_utf8()
                };
                out.push_str(&content[last_end..start]);
                let word: &str = &content[start..end];
                process_word(word, tags, &mut seen, &mut out);
                last_end = end;
            }
        }
    }
    out.push_str(&content[last_end..]);
    out
}

fn process_word(
    word: &str,
    tags: &mut Vec<Tag>,
    seen: &mut HashSet<Vec<String>>,
    out: &mut String,
) {
    // Hashtag
    if let Some(body) = word.strip_prefix('#') {
        let hashtag: &str = trim_token(body);
        if !hashtag.is_empty() && hashtag.chars().all(|c| c.is_alphanumeric() || c == '_') {
            push_tag(Tag::hashtag(hashtag.to_lowercase()), tags, seen);
        }
        out.push_str(word);
        return;
    }

    // Bech32 mention
    let candidate: Option<&str> = word
        .strip_prefix('@')
        .or_else(|| word.strip_prefix(NOSTR_URI_SCHEME));
    if let Some(candidate) = candidate {
        let entity: &str = trim_token(candidate);
        if let Ok(decoded) = Nip19::from_bech32(entity) {
            let trailing: &str = &candidate[entity.len()..];
            match decoded {
                Nip19::Pubkey(public_key) => {
                    push_tag(Tag::public_key(public_key), tags, seen);
                    rewrite(out, entity, trailing);
                    return;
                }
                Nip19::Profile(profile) => {
                    push_tag(Tag::public_key(profile.public_key), tags, seen);
                    rewrite(out, entity, trailing);
                    return;
                }
                Nip19::EventId(event_id) => {
                    push_tag(Tag::quote(event_id), tags, seen);
                    rewrite(out, entity, trailing);
                    return;
                }
                Nip19::Event(event) => {
                    push_tag(Tag::quote(event.event_id), tags, seen);
                    rewrite(out, entity, trailing);
                    return;
                }
                Nip19::Address(address) => {
                    if let Ok(tag) =
                        Tag::parse(["q", address.coordinate.to_string().as_str()])
                    {
                        push_tag(tag, tags, seen);
                    }
                    rewrite(out, entity, trailing);
                    return;
                }
                // Never reference secret keys from content
                Nip19::Secret(..) => {}
            }
        }
    }

    out.push_str(word);
}

/// Strip trailing punctuation from a token
fn trim_token(token: &str) -> &str {
    token.trim_end_matches(|c: char| !c.is_ascii_alphanumeric())
}

fn push_tag(tag: Tag, tags: &mut Vec<Tag>, seen: &mut HashSet<Vec<String>>) {
    if seen.insert(tag.as_slice().to_vec()) {
        tags.push(tag);
    }
}

fn rewrite(out: &mut String, entity: &str, trailing: &str) {
    out.push_str(NOSTR_URI_SCHEME);
    out.push_str(entity);
    out.push_str(trailing);
}
