//! # Rocket Crash Server
//!
//! Authoritative round engine and client-sync protocol for the rocket crash game.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   ROCKET CRASH SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── curve.rs    - Elapsed-time <-> multiplier curve         │
//! │  ├── clock.rs    - Injectable authoritative clock            │
//! │  ├── rng.rs      - Seeded Xorshift128+ crash-point source    │
//! │  └── format.rs   - Display formatting helpers                │
//! │                                                              │
//! │  game/           - Round engine (deterministic given clock)  │
//! │  ├── round.rs    - Round state machine                       │
//! │  ├── bets.rs     - Bet ledger and settlement                 │
//! │  ├── scheduler.rs- Authoritative tick loop                   │
//! │  ├── history.rs  - Bounded ring of completed rounds          │
//! │  └── events.rs   - Engine events for broadcast               │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── broadcast.rs- Observer fan-out hub                      │
//! │  └── server.rs   - WebSocket server                          │
//! │                                                              │
//! │  client/         - Observer-side reconciliation              │
//! │  └── observer.rs - Clock offset, prediction, lag detection   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Fairness Guarantee
//!
//! The `core/` and `game/` modules settle every bet against the
//! **authoritative clock only**:
//! - Crash point and crash instant are fixed at round creation
//! - Cashouts re-derive elapsed time from the server clock at processing time
//! - Client-reported timestamps and multipliers are never trusted
//! - The truncating curve never reports a multiplier the round has not reached
//!
//! Given the same clock readings and crash-source seed, the engine produces
//! identical rounds, settlements, and event streams.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod client;
pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use self::core::clock::{Clock, ManualClock, SystemClock};
pub use self::core::curve::{Curve, CurveError};
pub use self::core::rng::{CrashSource, SeededCrashSource};
pub use client::observer::{ObserverConfig, ObserverSession};
pub use game::bets::{Bet, BetError, BetStatus, PlayerId};
pub use game::round::{Round, RoundId, RoundPhase, RoundSnapshot};
pub use game::scheduler::{EngineConfig, RoundScheduler};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Scheduler tick interval (milliseconds)
pub const TICK_INTERVAL_MS: u64 = 100;

/// Curve growth-rate constant `k`, per millisecond of elapsed time
pub const GROWTH_RATE: f64 = 6e-5;
