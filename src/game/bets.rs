//! Bet Ledger
//!
//! Per-round bets and their settlement. All legality checks run against the
//! authoritative elapsed time handed in by the scheduler; client-reported
//! timestamps or multipliers never reach this module.
//!
//! Uses `BTreeMap` keyed by player id so auto-cashout settlement order is
//! deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::curve::{Curve, CurveError};
use crate::game::round::{RoundId, RoundPhase};

/// Opaque player identifier.
pub type PlayerId = Uuid;

/// Lifecycle of a single bet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetStatus {
    /// Placed during the betting window, round not yet running.
    Pending,
    /// Round is running; eligible for cashout.
    Active,
    /// Cashed out before the crash. Terminal.
    CashedOut,
    /// Still active when the round crashed. Terminal.
    Busted,
}

/// A player's bet in one round. At most one per player per round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bet {
    /// Owning player.
    pub player_id: PlayerId,
    /// Stake, in currency units.
    pub amount: f64,
    /// Optional multiplier at which the engine cashes out on the player's behalf.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_cashout_at: Option<f64>,
    /// Round the bet was placed in.
    pub round_id: RoundId,
    /// Current status.
    pub status: BetStatus,
    /// Multiplier locked in at cashout; only set when `CashedOut`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cashout_multiplier: Option<f64>,
    /// Payout locked in at cashout; only set when `CashedOut`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout: Option<f64>,
}

/// Outcome carried by [`BetError::AlreadySettled`].
///
/// Not a fault: the expected result of the auto/manual cashout race. The
/// caller reports "your bet was already settled, here is the outcome".
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SettledOutcome {
    /// The bet had already cashed out at this multiplier and payout.
    CashedOut {
        /// Multiplier of the earlier settlement.
        multiplier: f64,
        /// Payout of the earlier settlement.
        payout: f64,
    },
    /// The bet had already busted.
    Busted,
}

/// Bet placement and settlement errors. All are local to the requesting
/// player and never affect round state or other players.
#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum BetError {
    /// Amount non-positive, non-finite, over the cap, or auto-cashout below
    /// the configured minimum.
    #[error("invalid amount: {0}")]
    InvalidAmount(&'static str),

    /// The player already has a bet in this round.
    #[error("player already has a bet in this round")]
    DuplicateBet,

    /// Bets are only accepted while the betting window is open.
    #[error("round is not accepting bets")]
    RoundNotAcceptingBets,

    /// The player has no bet eligible for cashout.
    #[error("no active bet for player")]
    NoActiveBet,

    /// The authoritative elapsed time has reached the crash instant.
    #[error("round already crashed")]
    RoundAlreadyCrashed,

    /// The bet was settled by an earlier cashout or bust; carries the outcome.
    #[error("bet already settled")]
    AlreadySettled(SettledOutcome),

    /// Curve misuse bubbled up from settlement math.
    #[error(transparent)]
    Curve(#[from] CurveError),
}

/// Placement limits, taken from the engine configuration.
#[derive(Clone, Copy, Debug)]
pub struct BetLimits {
    /// Smallest accepted stake.
    pub min_bet: f64,
    /// Largest accepted stake.
    pub max_bet: f64,
    /// Smallest accepted auto-cashout multiplier.
    pub min_auto_cashout: f64,
    /// Profit is clamped to this value at settlement.
    pub max_profit: f64,
}

impl Default for BetLimits {
    fn default() -> Self {
        Self {
            min_bet: 0.01,
            max_bet: 10_000.0,
            min_auto_cashout: 1.01,
            max_profit: 1_000_000.0,
        }
    }
}

/// A successful settlement, for event emission and acks.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CashoutReceipt {
    /// Settled player.
    pub player_id: PlayerId,
    /// Multiplier certified at the settlement instant.
    pub multiplier: f64,
    /// `amount * multiplier`, profit-capped.
    pub payout: f64,
}

/// All bets of one round.
pub struct BetLedger {
    round_id: RoundId,
    limits: BetLimits,
    bets: BTreeMap<PlayerId, Bet>,
}

impl BetLedger {
    /// Create an empty ledger for `round_id`.
    pub fn new(round_id: RoundId, limits: BetLimits) -> Self {
        Self {
            round_id,
            limits,
            bets: BTreeMap::new(),
        }
    }

    /// Place a bet. Only legal while the round is `TakingBets`.
    pub fn place_bet(
        &mut self,
        phase: RoundPhase,
        player_id: PlayerId,
        amount: f64,
        auto_cashout_at: Option<f64>,
    ) -> Result<Bet, BetError> {
        if phase != RoundPhase::TakingBets {
            return Err(BetError::RoundNotAcceptingBets);
        }
        if !amount.is_finite() || amount <= 0.0 {
            return Err(BetError::InvalidAmount("amount must be positive"));
        }
        if amount < self.limits.min_bet {
            return Err(BetError::InvalidAmount("amount below minimum"));
        }
        if amount > self.limits.max_bet {
            return Err(BetError::InvalidAmount("amount above maximum"));
        }
        if let Some(auto) = auto_cashout_at {
            if !auto.is_finite() || auto < self.limits.min_auto_cashout {
                return Err(BetError::InvalidAmount("auto cashout below minimum"));
            }
        }
        if self.bets.contains_key(&player_id) {
            return Err(BetError::DuplicateBet);
        }

        let bet = Bet {
            player_id,
            amount,
            auto_cashout_at,
            round_id: self.round_id,
            status: BetStatus::Pending,
            cashout_multiplier: None,
            payout: None,
        };
        self.bets.insert(player_id, bet.clone());
        Ok(bet)
    }

    /// Flip every `Pending` bet to `Active`. Called exactly once, at the
    /// round's `Running` transition.
    pub fn activate_pending(&mut self) {
        for bet in self.bets.values_mut() {
            if bet.status == BetStatus::Pending {
                bet.status = BetStatus::Active;
            }
        }
    }

    /// Manual cashout at the authoritative `elapsed_ms`.
    ///
    /// The elapsed time is re-derived by the caller from the server clock at
    /// the moment the request is processed; `elapsed_ms >= crash_elapsed_ms`
    /// is rejected no matter what the requesting client believed was current.
    pub fn cash_out(
        &mut self,
        player_id: PlayerId,
        curve: &Curve,
        crash_elapsed_ms: u64,
        elapsed_ms: u64,
    ) -> Result<CashoutReceipt, BetError> {
        let limits = self.limits;
        let bet = self.bets.get_mut(&player_id).ok_or(BetError::NoActiveBet)?;
        match bet.status {
            BetStatus::Active => {}
            BetStatus::Pending => return Err(BetError::NoActiveBet),
            BetStatus::CashedOut => {
                return Err(BetError::AlreadySettled(SettledOutcome::CashedOut {
                    multiplier: bet.cashout_multiplier.unwrap_or(1.0),
                    payout: bet.payout.unwrap_or(bet.amount),
                }))
            }
            BetStatus::Busted => return Err(BetError::AlreadySettled(SettledOutcome::Busted)),
        }
        if elapsed_ms >= crash_elapsed_ms {
            return Err(BetError::RoundAlreadyCrashed);
        }
        // A non-finite payout means the round is effectively crashed at
        // this instant; never propagate the invalid value.
        let multiplier = curve.multiplier_at(elapsed_ms).map_err(|e| match e {
            CurveError::InfinitePayout => BetError::RoundAlreadyCrashed,
            other => BetError::Curve(other),
        })?;
        Ok(settle(bet, multiplier, &limits))
    }

    /// Settle every active bet whose auto-cashout threshold the curve has
    /// reached at this tick.
    ///
    /// The settlement instant is capped at the crash instant, so on the crash
    /// tick a threshold exactly equal to the crash multiplier settles as a
    /// win at that multiplier, while a threshold above it busts.
    pub fn settle_auto_cashouts(
        &mut self,
        curve: &Curve,
        crash_elapsed_ms: u64,
        elapsed_ms: u64,
    ) -> Vec<CashoutReceipt> {
        let settle_elapsed = elapsed_ms.min(crash_elapsed_ms);
        let multiplier = match curve.multiplier_at(settle_elapsed) {
            Ok(m) => m,
            Err(_) => return Vec::new(),
        };

        let limits = self.limits;
        let mut receipts = Vec::new();
        for bet in self.bets.values_mut() {
            if bet.status != BetStatus::Active {
                continue;
            }
            let Some(auto) = bet.auto_cashout_at else {
                continue;
            };
            if auto <= multiplier {
                receipts.push(settle(bet, multiplier, &limits));
            }
        }
        receipts
    }

    /// Bust every bet still active. Called exactly once, at the crash.
    pub fn bust_remaining(&mut self) -> Vec<PlayerId> {
        let mut busted = Vec::new();
        for bet in self.bets.values_mut() {
            if bet.status == BetStatus::Active || bet.status == BetStatus::Pending {
                bet.status = BetStatus::Busted;
                busted.push(bet.player_id);
            }
        }
        busted
    }

    /// Look up a player's bet.
    pub fn get(&self, player_id: &PlayerId) -> Option<&Bet> {
        self.bets.get(player_id)
    }

    /// Number of bets in the round.
    pub fn len(&self) -> usize {
        self.bets.len()
    }

    /// Whether the round has no bets.
    pub fn is_empty(&self) -> bool {
        self.bets.is_empty()
    }
}

/// Transition an active bet to `CashedOut` at `multiplier`.
fn settle(bet: &mut Bet, multiplier: f64, limits: &BetLimits) -> CashoutReceipt {
    let payout = (bet.amount * multiplier).min(bet.amount + limits.max_profit);
    bet.status = BetStatus::CashedOut;
    bet.cashout_multiplier = Some(multiplier);
    bet.payout = Some(payout);
    CashoutReceipt {
        player_id: bet.player_id,
        multiplier,
        payout,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> BetLedger {
        BetLedger::new(Uuid::new_v4(), BetLimits::default())
    }

    fn player(n: u8) -> PlayerId {
        Uuid::from_bytes([n; 16])
    }

    #[test]
    fn test_place_bet_validation() {
        let mut ledger = ledger();
        let p = player(1);

        assert!(matches!(
            ledger.place_bet(RoundPhase::TakingBets, p, 0.0, None),
            Err(BetError::InvalidAmount(_))
        ));
        assert!(matches!(
            ledger.place_bet(RoundPhase::TakingBets, p, -5.0, None),
            Err(BetError::InvalidAmount(_))
        ));
        assert!(matches!(
            ledger.place_bet(RoundPhase::TakingBets, p, f64::NAN, None),
            Err(BetError::InvalidAmount(_))
        ));
        assert!(matches!(
            ledger.place_bet(RoundPhase::TakingBets, p, 1_000_000.0, None),
            Err(BetError::InvalidAmount(_))
        ));
        assert!(matches!(
            ledger.place_bet(RoundPhase::TakingBets, p, 10.0, Some(1.0)),
            Err(BetError::InvalidAmount(_))
        ));

        let bet = ledger
            .place_bet(RoundPhase::TakingBets, p, 10.0, Some(2.5))
            .unwrap();
        assert_eq!(bet.status, BetStatus::Pending);
        assert_eq!(bet.amount, 10.0);
    }

    #[test]
    fn test_duplicate_bet_rejected() {
        let mut ledger = ledger();
        let p = player(1);
        ledger.place_bet(RoundPhase::TakingBets, p, 10.0, None).unwrap();
        assert_eq!(
            ledger.place_bet(RoundPhase::TakingBets, p, 5.0, None),
            Err(BetError::DuplicateBet)
        );
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_phase_gating() {
        let mut ledger = ledger();
        for phase in [RoundPhase::Loading, RoundPhase::Running, RoundPhase::Over] {
            assert_eq!(
                ledger.place_bet(phase, player(1), 10.0, None),
                Err(BetError::RoundNotAcceptingBets)
            );
        }
    }

    #[test]
    fn test_activate_pending() {
        let mut ledger = ledger();
        ledger.place_bet(RoundPhase::TakingBets, player(1), 10.0, None).unwrap();
        ledger.place_bet(RoundPhase::TakingBets, player(2), 20.0, None).unwrap();

        ledger.activate_pending();
        assert_eq!(ledger.get(&player(1)).unwrap().status, BetStatus::Active);
        assert_eq!(ledger.get(&player(2)).unwrap().status, BetStatus::Active);
    }

    #[test]
    fn test_manual_cashout() {
        let curve = Curve::through(4_000, 2.5);
        let mut ledger = ledger();
        let p = player(1);
        ledger.place_bet(RoundPhase::TakingBets, p, 10.0, None).unwrap();
        ledger.activate_pending();

        let receipt = ledger.cash_out(p, &curve, 5_000, 2_000).unwrap();
        assert!(receipt.multiplier >= 1.0);
        assert_eq!(receipt.payout, 10.0 * receipt.multiplier);

        let bet = ledger.get(&p).unwrap();
        assert_eq!(bet.status, BetStatus::CashedOut);
        assert_eq!(bet.cashout_multiplier, Some(receipt.multiplier));
    }

    #[test]
    fn test_cashout_at_or_after_crash_rejected() {
        let curve = Curve::through(4_000, 2.5);
        let mut ledger = ledger();
        let p = player(1);
        ledger.place_bet(RoundPhase::TakingBets, p, 10.0, None).unwrap();
        ledger.activate_pending();

        assert_eq!(
            ledger.cash_out(p, &curve, 5_000, 5_000),
            Err(BetError::RoundAlreadyCrashed)
        );
        assert_eq!(
            ledger.cash_out(p, &curve, 5_000, 7_500),
            Err(BetError::RoundAlreadyCrashed)
        );
        // The bet is untouched by rejections
        assert_eq!(ledger.get(&p).unwrap().status, BetStatus::Active);
    }

    #[test]
    fn test_second_cashout_is_already_settled_with_same_outcome() {
        let curve = Curve::through(4_000, 2.5);
        let mut ledger = ledger();
        let p = player(1);
        ledger.place_bet(RoundPhase::TakingBets, p, 10.0, None).unwrap();
        ledger.activate_pending();

        let first = ledger.cash_out(p, &curve, 5_000, 3_000).unwrap();
        let second = ledger.cash_out(p, &curve, 5_000, 3_010);
        match second {
            Err(BetError::AlreadySettled(SettledOutcome::CashedOut { multiplier, payout })) => {
                assert_eq!(multiplier, first.multiplier);
                assert_eq!(payout, first.payout);
            }
            other => panic!("expected AlreadySettled, got {other:?}"),
        }
    }

    #[test]
    fn test_no_active_bet() {
        let curve = Curve::default();
        let mut ledger = ledger();
        assert_eq!(
            ledger.cash_out(player(9), &curve, 5_000, 1_000),
            Err(BetError::NoActiveBet)
        );
    }

    #[test]
    fn test_auto_cashout_settles_at_tick_elapsed() {
        let curve = Curve::through(4_000, 2.5);
        let mut ledger = ledger();
        let p = player(1);
        ledger
            .place_bet(RoundPhase::TakingBets, p, 10.0, Some(2.5))
            .unwrap();
        ledger.activate_pending();

        // Threshold not reached yet
        assert!(ledger.settle_auto_cashouts(&curve, 5_000, 3_000).is_empty());
        assert_eq!(ledger.get(&p).unwrap().status, BetStatus::Active);

        // First tick at or past the threshold settles at the tick's multiplier
        let receipts = ledger.settle_auto_cashouts(&curve, 5_000, 4_100);
        assert_eq!(receipts.len(), 1);
        let receipt = receipts[0];
        assert!(receipt.multiplier >= 2.5 - 0.011);
        assert_eq!(receipt.payout, 10.0 * receipt.multiplier);
        assert_eq!(ledger.get(&p).unwrap().status, BetStatus::CashedOut);

        // Idempotent: a later tick does not settle again
        assert!(ledger.settle_auto_cashouts(&curve, 5_000, 4_200).is_empty());

        // A manual cashout losing the race gets the auto settlement's outcome
        match ledger.cash_out(p, &curve, 5_000, 4_110) {
            Err(BetError::AlreadySettled(SettledOutcome::CashedOut { multiplier, payout })) => {
                assert_eq!(multiplier, receipt.multiplier);
                assert_eq!(payout, receipt.payout);
            }
            other => panic!("expected AlreadySettled, got {other:?}"),
        }
    }

    #[test]
    fn test_auto_equal_to_crash_wins_at_crash_multiplier() {
        let curve = Curve::through(4_000, 2.5);
        let crash_elapsed = curve.elapsed_at(3.0).unwrap();
        let crash_multiplier = curve.multiplier_at(crash_elapsed).unwrap();

        let mut ledger = ledger();
        let winner = player(1);
        let loser = player(2);
        ledger
            .place_bet(RoundPhase::TakingBets, winner, 10.0, Some(crash_multiplier))
            .unwrap();
        ledger
            .place_bet(RoundPhase::TakingBets, loser, 10.0, Some(crash_multiplier + 0.01))
            .unwrap();
        ledger.activate_pending();

        // Crash tick: elapsed past the crash instant, settlement capped at it
        let receipts = ledger.settle_auto_cashouts(&curve, crash_elapsed, crash_elapsed + 40);
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].player_id, winner);
        assert_eq!(receipts[0].multiplier, crash_multiplier);

        let busted = ledger.bust_remaining();
        assert_eq!(busted, vec![loser]);
        assert_eq!(ledger.get(&loser).unwrap().status, BetStatus::Busted);
    }

    #[test]
    fn test_bet_reaches_exactly_one_terminal_state() {
        let curve = Curve::through(4_000, 2.5);
        let mut ledger = ledger();
        let p = player(1);
        ledger.place_bet(RoundPhase::TakingBets, p, 10.0, None).unwrap();
        ledger.activate_pending();

        ledger.cash_out(p, &curve, 5_000, 3_000).unwrap();
        // Busting after settlement leaves the cashed-out bet alone
        assert!(ledger.bust_remaining().is_empty());
        assert_eq!(ledger.get(&p).unwrap().status, BetStatus::CashedOut);
    }

    #[test]
    fn test_profit_cap() {
        let limits = BetLimits {
            max_profit: 50.0,
            ..Default::default()
        };
        let curve = Curve::through(1_000, 100.0);
        let mut ledger = BetLedger::new(Uuid::new_v4(), limits);
        let p = player(1);
        ledger.place_bet(RoundPhase::TakingBets, p, 10.0, None).unwrap();
        ledger.activate_pending();

        let receipt = ledger.cash_out(p, &curve, 2_000, 999).unwrap();
        assert_eq!(receipt.payout, 60.0); // amount + capped profit
    }

    #[test]
    fn test_settlement_order_is_deterministic() {
        let curve = Curve::through(1_000, 2.0);
        let mut ledger = ledger();
        // Insert in reverse id order; settlement must come back sorted
        for n in (1..=3u8).rev() {
            ledger
                .place_bet(RoundPhase::TakingBets, player(n), 10.0, Some(1.5))
                .unwrap();
        }
        ledger.activate_pending();

        let receipts = ledger.settle_auto_cashouts(&curve, 5_000, 1_000);
        let ids: Vec<PlayerId> = receipts.iter().map(|r| r.player_id).collect();
        assert_eq!(ids, vec![player(1), player(2), player(3)]);
    }
}
