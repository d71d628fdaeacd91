//! Engine Events
//!
//! Everything the round engine tells the outside world. The network layer
//! converts these into protocol messages for broadcast; tests assert on them
//! directly.

use serde::{Deserialize, Serialize};

use crate::game::bets::PlayerId;
use crate::game::round::{RoundId, RoundSnapshot};

/// An event emitted by the scheduler or the request path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    /// A lifecycle transition, or the per-tick snapshot outside Running.
    RoundUpdate {
        /// Observer-facing round view.
        round: RoundSnapshot,
        /// Authoritative timestamp of the emission.
        server_time_ms: u64,
    },

    /// Lightweight per-tick multiplier update while Running.
    MultiplierTick {
        /// Round being ticked.
        round_id: RoundId,
        /// Authoritative elapsed milliseconds.
        elapsed_ms: u64,
        /// Multiplier certified at `elapsed_ms`.
        multiplier: f64,
        /// Authoritative timestamp of the emission.
        server_time_ms: u64,
    },

    /// A bet entered the ledger.
    BetPlaced {
        /// Round the bet belongs to.
        round_id: RoundId,
        /// Betting player.
        player_id: PlayerId,
        /// Stake.
        amount: f64,
        /// Optional auto-cashout threshold.
        auto_cashout_at: Option<f64>,
    },

    /// A bet settled as a win, by hand or by auto-cashout.
    PlayerCashedOut {
        /// Round the bet belonged to.
        round_id: RoundId,
        /// Settled player.
        player_id: PlayerId,
        /// Multiplier locked in.
        multiplier: f64,
        /// Payout locked in.
        payout: f64,
    },

    /// A completed round was archived into the history ring.
    HistoryAppended {
        /// Archived round.
        round_id: RoundId,
        /// Its crash multiplier.
        crash_multiplier: f64,
    },
}
