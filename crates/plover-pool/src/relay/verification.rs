// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Adaptive signature verification sampler.
//!
//! Every event from a new relay is verified. A streak of valid signatures
//! halves the sampling rate down to a floor; any invalid signature snaps the
//! rate back to 1.0 and opens a cooldown window during which everything is
//! verified. Repeated invalid signatures mark the relay untrusted.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use plover::secp256k1::rand::{self, Rng};

/// Sampler tunables
#[derive(Debug, Clone, Copy)]
pub struct SamplerOptions {
    /// Consecutive valid signatures needed to halve the rate (default: 16)
    pub streak: u32,
    /// Sampling rate floor (default: 1/16)
    pub floor: f64,
    /// Cooldown after an invalid signature (default: 5 min)
    pub cooldown: Duration,
    /// Invalid signatures before the relay is dropped as untrusted (default: 3)
    pub max_invalid: u32,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            streak: 16,
            floor: 1.0 / 16.0,
            cooldown: Duration::from_secs(300),
            max_invalid: 3,
        }
    }
}

/// Verification decision for one incoming event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerDecision {
    /// Verify the signature
    Verify,
    /// Accept without verification
    Skip,
    /// Relay is untrusted: drop the event
    Drop,
}

#[derive(Debug)]
struct SamplerState {
    rate: f64,
    consecutive_valid: u32,
    invalid_total: u32,
    cooldown_until: Option<Instant>,
    untrusted: bool,
}

/// Per-relay signature verification sampler
#[derive(Debug)]
pub struct VerificationSampler {
    opts: SamplerOptions,
    state: Mutex<SamplerState>,
}

impl VerificationSampler {
    /// New sampler starting at full verification
    pub fn new(opts: SamplerOptions) -> Self {
        Self {
            opts,
            state: Mutex::new(SamplerState {
                rate: 1.0,
                consecutive_valid: 0,
                invalid_total: 0,
                cooldown_until: None,
                untrusted: false,
            }),
        }
    }

    /// Current sampling rate
    pub fn rate(&self) -> f64 {
        let state = self.state.lock().expect("sampler poisoned");
        state.rate
    }

    /// Check if the relay has been marked untrusted
    pub fn is_untrusted(&self) -> bool {
        let state = self.state.lock().expect("sampler poisoned");
        state.untrusted
    }

    /// Decide whether the next event must be verified
    pub fn decide(&self) -> SamplerDecision {
        let state = self.state.lock().expect("sampler poisoned");

        if state.untrusted {
            return SamplerDecision::Drop;
        }

        // Verify everything while cooling down
        if let Some(until) = state.cooldown_until {
            if Instant::now() < until {
                return SamplerDecision::Verify;
            }
        }

        if state.rate >= 1.0 {
            return SamplerDecision::Verify;
        }

        let mut rng = rand::thread_rng();
        if rng.gen::<f64>() < state.rate {
            SamplerDecision::Verify
        } else {
            SamplerDecision::Skip
        }
    }

    /// Record a valid signature
    pub fn record_valid(&self) {
        let mut state = self.state.lock().expect("sampler poisoned");
        state.consecutive_valid += 1;
        if state.consecutive_valid >= self.opts.streak {
            state.consecutive_valid = 0;
            state.rate = (state.rate / 2.0).max(self.opts.floor);
        }
    }

    /// Record an invalid signature
    pub fn record_invalid(&self) {
        let mut state = self.state.lock().expect("sampler poisoned");
        state.consecutive_valid = 0;
        state.rate = 1.0;
        state.invalid_total += 1;
        state.cooldown_until = Some(Instant::now() + self.opts.cooldown);
        if state.invalid_total >= self.opts.max_invalid {
            state.untrusted = true;
        }
    }
}

impl Default for VerificationSampler {
    fn default() -> Self {
        Self::new(SamplerOptions::default())
    }
}
