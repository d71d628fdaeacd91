//! Core deterministic primitives.
//!
//! Everything the round engine needs that must behave identically under test
//! and in production: the payout curve, the injectable clock, and the seeded
//! crash-point source.

pub mod clock;
pub mod curve;
pub mod format;
pub mod rng;

// Re-export core types
pub use clock::{Clock, ManualClock, SystemClock};
pub use curve::{Curve, CurveError};
pub use rng::{derive_round_seed, CrashSource, SeededCrashSource, Xorshift128};
