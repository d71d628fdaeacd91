//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are serialized as JSON for debugging ease,
//! with optional binary (bincode) for flat payload structs.

use serde::{Deserialize, Serialize};

use crate::game::bets::{BetError, PlayerId};
use crate::game::history::HistoryEntry;
use crate::game::round::{RoundId, RoundSnapshot};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Identify this connection's player.
    Join {
        /// The player placing bets over this connection.
        player_id: PlayerId,
    },

    /// Place a bet in the current round.
    PlaceBet(BetRequest),

    /// Cash out the player's active bet.
    ///
    /// Deliberately carries no timestamp or multiplier: settlement uses the
    /// server clock at processing time, nothing client-reported.
    CashOut,

    /// Request a fresh authoritative snapshot (connect or lag recovery).
    SyncRequest,

    /// Request recent round history.
    HistoryRequest {
        /// Maximum entries to return.
        limit: Option<usize>,
    },

    /// Ping for latency measurement.
    Ping {
        /// Echoed back in the pong.
        timestamp: u64,
    },
}

/// Bet placement payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetRequest {
    /// Stake, in currency units.
    pub amount: f64,
    /// Optional auto-cashout threshold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_cashout_at: Option<f64>,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Join accepted.
    Joined {
        /// Echo of the joined player.
        player_id: PlayerId,
        /// Server version for compatibility checks.
        server_version: String,
    },

    /// Lifecycle transition, or the per-tick snapshot outside Running.
    RoundUpdate {
        /// Observer-facing round view.
        round: RoundSnapshot,
        /// Authoritative timestamp (ms), for clock reconciliation.
        server_time: u64,
    },

    /// Lightweight per-tick update while the round is running.
    MultiplierTick {
        /// Round being ticked.
        round_id: RoundId,
        /// Authoritative elapsed milliseconds.
        elapsed: u64,
        /// Multiplier certified at `elapsed`.
        multiplier: f64,
        /// Authoritative timestamp (ms), for clock reconciliation.
        server_time: u64,
    },

    /// A bet entered the current round.
    BetPlaced {
        /// Round the bet belongs to.
        round_id: RoundId,
        /// Betting player.
        player_id: PlayerId,
        /// Stake.
        amount: f64,
        /// Optional auto-cashout threshold.
        #[serde(skip_serializing_if = "Option::is_none")]
        auto_cashout_at: Option<f64>,
    },

    /// A bet settled as a win.
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

    /// A completed round was archived.
    HistoryAppended {
        /// Archived round.
        round_id: RoundId,
        /// Its crash multiplier.
        crash_multiplier: f64,
    },

    /// Reply to a history request, newest first.
    HistorySnapshot {
        /// Archived rounds.
        entries: Vec<HistoryEntry>,
    },

    /// Bet accepted.
    BetAck {
        /// Round the bet entered.
        round_id: RoundId,
        /// Accepted stake.
        amount: f64,
        /// Accepted auto-cashout threshold.
        #[serde(skip_serializing_if = "Option::is_none")]
        auto_cashout_at: Option<f64>,
    },

    /// Cashout succeeded, or had already succeeded (`already_settled`).
    PayoutAck {
        /// Round the bet belonged to.
        round_id: RoundId,
        /// Multiplier locked in.
        multiplier: f64,
        /// Payout locked in.
        payout: f64,
        /// True when an earlier auto/manual settlement won the race; the
        /// figures are that settlement's outcome.
        already_settled: bool,
    },

    /// Request rejected.
    Error(ErrorReply),

    /// Pong response.
    Pong {
        /// Echo of the ping timestamp.
        timestamp: u64,
        /// Authoritative timestamp (ms).
        server_time: u64,
    },

    /// Server is shutting down.
    Shutdown {
        /// Human-readable reason.
        reason: String,
    },
}

/// Rejection reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReply {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Bet amount or auto-cashout outside configured bounds.
    InvalidAmount,
    /// Player already has a bet in this round.
    DuplicateBet,
    /// Betting window is closed.
    RoundNotAcceptingBets,
    /// No bet eligible for cashout.
    NoActiveBet,
    /// The round crashed before the request was processed.
    RoundAlreadyCrashed,
    /// The bet was settled earlier; the outcome stands.
    AlreadySettled,
    /// Message arrived before a `Join`.
    NotJoined,
    /// Message could not be parsed.
    InvalidInput,
    /// Internal error.
    InternalError,
}

/// Map a ledger rejection to its wire reply.
///
/// `AlreadySettled(CashedOut)` is not mapped here: the server answers it with
/// a `PayoutAck` carrying the earlier outcome, because the settled race is
/// not a fault the player should see as one.
pub fn error_reply(err: &BetError) -> ErrorReply {
    let code = match err {
        BetError::InvalidAmount(_) => ErrorCode::InvalidAmount,
        BetError::DuplicateBet => ErrorCode::DuplicateBet,
        BetError::RoundNotAcceptingBets => ErrorCode::RoundNotAcceptingBets,
        BetError::NoActiveBet => ErrorCode::NoActiveBet,
        BetError::RoundAlreadyCrashed => ErrorCode::RoundAlreadyCrashed,
        BetError::AlreadySettled(_) => ErrorCode::AlreadySettled,
        BetError::Curve(_) => ErrorCode::InternalError,
    };
    ErrorReply {
        code,
        message: err.to_string(),
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl BetRequest {
    /// Serialize to binary. Tagged enums are JSON-only; flat payloads like
    /// this one may ride the binary path.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::bets::SettledOutcome;
    use crate::game::round::RoundPhase;
    use uuid::Uuid;

    #[test]
    fn test_client_message_json_roundtrip() {
        let msg = ClientMessage::PlaceBet(BetRequest {
            amount: 12.5,
            auto_cashout_at: Some(2.0),
        });

        let json = msg.to_json().unwrap();
        let parsed = ClientMessage::from_json(&json).unwrap();

        if let ClientMessage::PlaceBet(req) = parsed {
            assert_eq!(req.amount, 12.5);
            assert_eq!(req.auto_cashout_at, Some(2.0));
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn test_cashout_carries_no_client_state() {
        let json = ClientMessage::CashOut.to_json().unwrap();
        assert_eq!(json, r#"{"type":"cash_out"}"#);
    }

    #[test]
    fn test_server_message_json_roundtrip() {
        let round_id = Uuid::from_bytes([3; 16]);
        let msg = ServerMessage::MultiplierTick {
            round_id,
            elapsed: 4_000,
            multiplier: 2.5,
            server_time: 1_234_567,
        };

        let json = msg.to_json().unwrap();
        let parsed = ServerMessage::from_json(&json).unwrap();

        if let ServerMessage::MultiplierTick {
            elapsed,
            multiplier,
            ..
        } = parsed
        {
            assert_eq!(elapsed, 4_000);
            assert_eq!(multiplier, 2.5);
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn test_round_update_roundtrip() {
        let snapshot = RoundSnapshot {
            id: Uuid::from_bytes([7; 16]),
            phase: RoundPhase::Over,
            betting_closes_at: None,
            started_at: Some(1_000_000),
            crash_multiplier: Some(3.21),
        };
        let msg = ServerMessage::RoundUpdate {
            round: snapshot,
            server_time: 1_005_000,
        };

        let json = msg.to_json().unwrap();
        assert!(json.contains("round_update"));
        let parsed = ServerMessage::from_json(&json).unwrap();
        if let ServerMessage::RoundUpdate { round, server_time } = parsed {
            assert_eq!(round, snapshot);
            assert_eq!(server_time, 1_005_000);
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn test_error_codes_snake_case() {
        let msg = ServerMessage::Error(ErrorReply {
            code: ErrorCode::RoundAlreadyCrashed,
            message: "round already crashed".to_string(),
        });
        let json = msg.to_json().unwrap();
        assert!(json.contains("round_already_crashed"));
    }

    #[test]
    fn test_error_reply_mapping() {
        assert_eq!(
            error_reply(&BetError::DuplicateBet).code,
            ErrorCode::DuplicateBet
        );
        assert_eq!(
            error_reply(&BetError::InvalidAmount("amount must be positive")).code,
            ErrorCode::InvalidAmount
        );
        assert_eq!(
            error_reply(&BetError::AlreadySettled(SettledOutcome::Busted)).code,
            ErrorCode::AlreadySettled
        );
    }

    #[test]
    fn test_binary_serialization_bet_request() {
        let req = BetRequest {
            amount: 10.0,
            auto_cashout_at: Some(2.5),
        };

        let bytes = req.to_bytes().unwrap();
        let parsed = BetRequest::from_bytes(&bytes).unwrap();

        assert_eq!(parsed.amount, 10.0);
        assert_eq!(parsed.auto_cashout_at, Some(2.5));
    }
}
