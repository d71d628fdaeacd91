//! Crash-Point Generation
//!
//! Seeded Xorshift128+ PRNG and the crash-multiplier draw built on it.
//! Given the same seed, produces identical draws on all platforms.
//!
//! The draw method is deliberately behind the [`CrashSource`] trait: a
//! player-verifiable commitment scheme can replace [`SeededCrashSource`]
//! without touching the round state machine.

use sha2::{Digest, Sha256};

/// Default ceiling for drawn crash multipliers.
pub const DEFAULT_MAX_MULTIPLIER: f64 = 10_000.0;

/// Source of target crash multipliers, one draw per round.
///
/// Implementations must return a finite value >= 1.00; the scheduler treats
/// anything else as a round-fatal anomaly and abandons the round.
pub trait CrashSource: Send {
    /// Draw the target crash multiplier for the next round.
    fn next_crash_multiplier(&mut self) -> f64;
}

/// Deterministic PRNG using the Xorshift128+ algorithm.
///
/// # Example
///
/// ```
/// use rocket_crash::core::rng::Xorshift128;
///
/// let mut rng = Xorshift128::new(12345);
/// let value = rng.next_u64();
/// assert_eq!(value, 6233086606872742541); // Always the same!
/// ```
#[derive(Clone, Debug)]
pub struct Xorshift128 {
    state: [u64; 2],
}

impl Xorshift128 {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// Uses SplitMix64 to initialize the internal state, ensuring
    /// good distribution even from weak seeds.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // State must never be all zeros
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Generate a uniform f64 in [0, 1).
    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        // 53 mantissa bits of the raw draw
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }
}

/// SplitMix64 for seed initialization.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Derive a round-stream seed from the operator's server seed.
///
/// Domain-separated SHA-256; the same server seed and stream index always
/// produce the same round sequence, which makes full-session replays possible.
pub fn derive_round_seed(server_seed: &[u8; 32], stream_index: u64) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(b"ROCKET_CRASH_SEED_V1");
    hasher.update(server_seed);
    hasher.update(stream_index.to_le_bytes());
    let hash = hasher.finalize();

    u64::from_le_bytes(hash[0..8].try_into().unwrap())
}

/// Seeded crash-multiplier source.
///
/// Draws follow an inverse-uniform tail: `P(crash >= x) ~ 0.99 / x`, truncated
/// to two decimals and clamped to `[1.00, max_multiplier]`. Roughly 1% of
/// rounds bust instantly at 1.00.
#[derive(Clone, Debug)]
pub struct SeededCrashSource {
    rng: Xorshift128,
    max_multiplier: f64,
}

impl SeededCrashSource {
    /// Create a source from a 64-bit seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Xorshift128::new(seed),
            max_multiplier: DEFAULT_MAX_MULTIPLIER,
        }
    }

    /// Create a source from an operator server seed.
    pub fn from_server_seed(server_seed: &[u8; 32]) -> Self {
        Self::new(derive_round_seed(server_seed, 0))
    }

    /// Override the multiplier ceiling.
    pub fn with_max_multiplier(mut self, max_multiplier: f64) -> Self {
        self.max_multiplier = max_multiplier;
        self
    }
}

impl CrashSource for SeededCrashSource {
    fn next_crash_multiplier(&mut self) -> f64 {
        let u = self.rng.next_f64();
        let raw = 0.99 / (1.0 - u);
        let truncated = (raw * 100.0).floor() / 100.0;
        truncated.clamp(1.0, self.max_multiplier)
    }
}

// =============================================================================
// TESTS
// =============================================================================
