// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! HKDF Util

use bitcoin_hashes::hmac::{Hmac, HmacEngine};
use bitcoin_hashes::sha256::Hash as Sha256Hash;
use bitcoin_hashes::{Hash, HashEngine};

/// HKDF extract
pub fn extract(salt: &[u8], input_key_material: &[u8]) -> [u8; 32] {
    let mut engine: HmacEngine<Sha256Hash> = HmacEngine::new(salt);
    engine.input(input_key_material);
    Hmac::from_engine(engine).to_byte_array()
}

/// HKDF expand
pub fn expand(prk: &[u8], info: &[u8], output_len: usize) -> Vec<u8> {
    let mut output: Vec<u8> = Vec::with_capacity(output_len);
    let mut t: Vec<u8> = Vec::with_capacity(32);

    let mut i: u8 = 1u8;
    while output.len() < output_len {
        let mut engine: HmacEngine<Sha256Hash> = HmacEngine::new(prk);

        if !t.is_empty() {
            engine.input(&t);
        }

        engine.input(info);
        engine.input(&[i]);

        t = Hmac::from_engine(engine).to_byte_array().to_vec();
        output.extend_from_slice(&t);

        i += 1;
    }

    output.truncate(output_len);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_len() {
        let prk: [u8; 32] = extract(b"salt", b"key material");
        assert_eq!(expand(&prk, b"info", 76).len(), 76);
        assert_eq!(expand(&prk, b"info", 32).len(), 32);
        assert_eq!(expand(&prk, b"info", 33).len(), 33);
    }
}
