// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! NIP13: Proof of Work
//!
//! <https://github.com/nostr-protocol/nips/blob/master/13.md>

use crate::event::tag::Tag;
use crate::event::UnsignedEvent;

/// Gets the number of leading zero bits. Result is between 0 and 255.
pub fn get_leading_zero_bits<T>(h: T) -> u8
where
    T: AsRef<[u8]>,
{
    let mut res: u8 = 0u8;
    for b in h.as_ref().iter() {
        if *b == 0 {
            res += 8;
        } else {
            res += b.leading_zeros() as u8;
            return res;
        }
    }
    res
}

/// Mine the event id to the target difficulty.
///
/// Replaces any existing `nonce` tag, recomputing the id per attempt. Stops at
/// `max_iterations` attempts; returns whether the target was reached. The
/// event keeps the last tried nonce either way.
pub fn mine(unsigned: &mut UnsignedEvent, difficulty: u8, max_iterations: u64) -> bool {
    unsigned.tags.retain(|tag| tag.name() != "nonce");
    let nonce_index: usize = unsigned.tags.len();
    unsigned
        .tags
        .push(nonce_tag(0, difficulty));

    for nonce in 0..max_iterations {
        unsigned.tags[nonce_index] = nonce_tag(nonce, difficulty);
        unsigned.id = None;
        unsigned.ensure_id();

        if let Some(id) = unsigned.id {
            if get_leading_zero_bits(id.as_bytes()) >= difficulty {
                return true;
            }
        }
    }

    false
}

fn nonce_tag(nonce: u64, difficulty: u8) -> Tag {
    let nonce: String = nonce.to_string();
    let difficulty: String = difficulty.to_string();
    Tag::parse(["nonce", nonce.as_str(), difficulty.as_str()]).expect("non-empty tag")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Keys, Kind, Timestamp};

    #[test]
    fn test_get_leading_zero_bits() {
        let bytes =
            hex::decode("0fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff")
                .unwrap();
        assert_eq!(get_leading_zero_bits(&bytes), 4);

        let bytes =
            hex::decode("2fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff")
                .unwrap();
        assert_eq!(get_leading_zero_bits(&bytes), 2);

        let bytes =
            hex::decode("0000000000000000000000000000000000000000000000000000000000000000")
                .unwrap();
        assert_eq!(get_leading_zero_bits(&bytes), 255);
    }

    #[test]
    fn test_mine_low_difficulty() {
        let keys = Keys::generate();
        let mut unsigned = UnsignedEvent::new(
            keys.public_key(),
            Timestamp::from(1234567890),
            Kind::TEXT_NOTE,
            [],
            "pow test",
        );

        assert!(mine(&mut unsigned, 8, 100_000));
        let id = unsigned.id.unwrap();
        assert!(id.check_pow(8));
        assert!(unsigned.tags.iter().any(|tag| tag.name() == "nonce"));
        unsigned.verify_id().unwrap();
    }

    #[test]
    fn test_mine_gives_up() {
        let keys = Keys::generate();
        let mut unsigned = UnsignedEvent::new(
            keys.public_key(),
            Timestamp::from(1234567890),
            Kind::TEXT_NOTE,
            [],
            "pow test",
        );

        // One attempt almost never yields 30 leading zero bits
        assert!(!mine(&mut unsigned, 30, 1));
    }
}
