//! Round Engine
//!
//! The authoritative game logic. Deterministic given a clock and a crash
//! source; the network layer supplies both and serializes access.
//!
//! ## Module Structure
//!
//! - `round`: round state machine
//! - `bets`: bet ledger, placement, settlement
//! - `scheduler`: authoritative tick loop and lifecycle transitions
//! - `history`: bounded ring of completed rounds
//! - `events`: events emitted toward the broadcast channel

pub mod bets;
pub mod events;
pub mod history;
pub mod round;
pub mod scheduler;

// Re-export key types
pub use bets::{Bet, BetError, BetLedger, BetStatus, CashoutReceipt, PlayerId, SettledOutcome};
pub use events::EngineEvent;
pub use history::{HistoryEntry, HistoryRing};
pub use round::{Round, RoundId, RoundPhase, RoundSnapshot};
pub use scheduler::{EngineConfig, RoundScheduler};
