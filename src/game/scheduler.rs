//! Authoritative Round Scheduler
//!
//! Drives the round lifecycle on a fixed tick. Every transition is
//! state-driven (elapsed >= threshold) and checked on the tick rather than
//! scheduled on a timer, so scheduler jitter cannot drift the crash instant
//! away from the authoritative clock.
//!
//! Settlement order within a tick: auto-cashouts first, then the crash
//! check. A bet whose threshold lands exactly on the crash multiplier is
//! honored as a win, never a bust.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::core::clock::Clock;
use crate::core::curve::Curve;
use crate::core::format::format_multiplier;
use crate::core::rng::CrashSource;
use crate::game::bets::{
    Bet, BetError, BetLedger, BetLimits, BetStatus, CashoutReceipt, PlayerId, SettledOutcome,
};
use crate::game::events::EngineEvent;
use crate::game::history::{HistoryEntry, HistoryRing};
use crate::game::round::{Round, RoundPhase, RoundSnapshot};
use crate::{GROWTH_RATE, TICK_INTERVAL_MS};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Scheduler tick interval (ms).
    pub tick_interval_ms: u64,
    /// Betting window duration (ms).
    pub betting_window_ms: u64,
    /// Post-crash cooldown before the next round opens (ms).
    pub cooldown_ms: u64,
    /// Curve growth rate `k`, per millisecond.
    pub growth_rate: f64,
    /// Smallest accepted stake.
    pub min_bet: f64,
    /// Largest accepted stake.
    pub max_bet: f64,
    /// Smallest accepted auto-cashout multiplier.
    pub min_auto_cashout: f64,
    /// Profit cap applied at settlement.
    pub max_profit: f64,
    /// Ceiling for drawn crash multipliers.
    pub max_multiplier: f64,
    /// Completed rounds kept in the history ring.
    pub history_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: TICK_INTERVAL_MS,
            betting_window_ms: 5_000,
            cooldown_ms: 3_000,
            growth_rate: GROWTH_RATE,
            min_bet: 0.01,
            max_bet: 10_000.0,
            min_auto_cashout: 1.01,
            max_profit: 1_000_000.0,
            max_multiplier: 10_000.0,
            history_capacity: 50,
        }
    }
}

impl EngineConfig {
    fn limits(&self) -> BetLimits {
        BetLimits {
            min_bet: self.min_bet,
            max_bet: self.max_bet,
            min_auto_cashout: self.min_auto_cashout,
            max_profit: self.max_profit,
        }
    }
}

/// The authoritative round engine.
///
/// Owns the current round, its bet ledger, and the history of completed
/// rounds. All mutation happens either through [`RoundScheduler::tick`] or
/// through the bet/cashout request path; the caller serializes the two
/// (one lock, one logical clock), which is the whole concurrency story.
pub struct RoundScheduler {
    config: EngineConfig,
    curve: Curve,
    clock: Arc<dyn Clock>,
    source: Box<dyn CrashSource>,
    round: Round,
    ledger: BetLedger,
    history: HistoryRing,
}

impl RoundScheduler {
    /// Create the engine and open the first round's betting window.
    pub fn new(config: EngineConfig, clock: Arc<dyn Clock>, mut source: Box<dyn CrashSource>) -> Self {
        let curve = Curve::new(config.growth_rate);
        let mut round = Self::draw_round(source.as_mut(), &curve, config.max_multiplier);
        round.open_betting(clock.now_ms() + config.betting_window_ms);
        info!(round = %round.id(), "betting open");

        let ledger = BetLedger::new(round.id(), config.limits());
        let history = HistoryRing::new(config.history_capacity);

        Self {
            config,
            curve,
            clock,
            source,
            round,
            ledger,
            history,
        }
    }

    /// Draw the next round's crash point.
    ///
    /// A bad draw (non-finite, < 1.00, or outside the curve's range) is a
    /// round-fatal anomaly: log it and retry with a fresh draw. If the source
    /// stays broken the engine degrades to an instant-bust round rather than
    /// stalling the tick loop.
    fn draw_round(source: &mut dyn CrashSource, curve: &Curve, max_multiplier: f64) -> Round {
        for attempt in 0..3 {
            let drawn = source.next_crash_multiplier();
            if !drawn.is_finite() || drawn < 1.0 {
                error!(drawn, attempt, "crash source produced an invalid draw, abandoning round");
                continue;
            }
            let drawn = drawn.min(max_multiplier);
            let derived = curve
                .elapsed_at(drawn)
                .and_then(|elapsed| curve.multiplier_at(elapsed).map(|m| (elapsed, m)));
            match derived {
                Ok((crash_elapsed_ms, crash_multiplier)) => {
                    return Round::new(crash_elapsed_ms, crash_multiplier)
                }
                Err(err) => {
                    error!(%err, drawn, attempt, "crash point derivation failed, abandoning round");
                }
            }
        }
        error!("crash source unusable, opening instant-bust round");
        Round::new(0, 1.0)
    }

    /// Advance the engine by one tick.
    ///
    /// Emits the per-tick event stream: exactly one tick or lifecycle event,
    /// preceded by any settlements it produced.
    pub fn tick(&mut self) -> Vec<EngineEvent> {
        let now = self.clock.now_ms();
        let mut events = Vec::new();

        match self.round.phase() {
            RoundPhase::Loading => {
                // Rounds open their window at creation; reachable only if a
                // constructor path changes. Recover by opening now.
                self.round.open_betting(now + self.config.betting_window_ms);
                events.push(self.round_update(now));
            }
            RoundPhase::TakingBets => {
                if now >= self.round.betting_closes_at().unwrap_or(now) {
                    self.round.start(now);
                    self.ledger.activate_pending();
                    info!(round = %self.round.id(), bets = self.ledger.len(), "round running");
                }
                events.push(self.round_update(now));
            }
            RoundPhase::Running => self.tick_running(now, &mut events),
            RoundPhase::Over => {
                let reopen_at = self.round.ended_at().unwrap_or(now) + self.config.cooldown_ms;
                if now >= reopen_at {
                    self.open_next_round(now, &mut events);
                } else {
                    events.push(self.round_update(now));
                }
            }
        }

        events
    }

    fn tick_running(&mut self, now: u64, events: &mut Vec<EngineEvent>) {
        let elapsed = self.round.elapsed_at(now);
        let crash_elapsed = self.round.crash_elapsed_ms();
        let round_id = self.round.id();

        // Cashouts settle before the crash check, on this tick's elapsed time.
        for receipt in self
            .ledger
            .settle_auto_cashouts(&self.curve, crash_elapsed, elapsed)
        {
            debug!(
                round = %round_id,
                player = %receipt.player_id,
                multiplier = %format_multiplier(receipt.multiplier),
                "auto cashout settled"
            );
            events.push(EngineEvent::PlayerCashedOut {
                round_id,
                player_id: receipt.player_id,
                multiplier: receipt.multiplier,
                payout: receipt.payout,
            });
        }

        // A curve overflow below the crash instant means the round is
        // effectively crashed right now.
        let live_multiplier = if elapsed < crash_elapsed {
            self.curve.multiplier_at(elapsed).ok()
        } else {
            None
        };

        match live_multiplier {
            Some(multiplier) => events.push(EngineEvent::MultiplierTick {
                round_id,
                elapsed_ms: elapsed,
                multiplier,
                server_time_ms: now,
            }),
            None => {
                self.round.crash(now);
                let busted = self.ledger.bust_remaining();
                info!(
                    round = %round_id,
                    multiplier = %format_multiplier(self.round.crash_multiplier()),
                    busted = busted.len(),
                    "round crashed"
                );
                events.push(self.round_update(now));
            }
        }
    }

    /// Archive the completed round and open the next one's betting window.
    fn open_next_round(&mut self, now: u64, events: &mut Vec<EngineEvent>) {
        let ended_ms = self.round.ended_at().unwrap_or(now);
        let entry = HistoryEntry {
            round_id: self.round.id(),
            crash_multiplier: self.round.crash_multiplier(),
            ended_at: DateTime::<Utc>::from_timestamp_millis(ended_ms as i64)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        };

        let mut next = Self::draw_round(self.source.as_mut(), &self.curve, self.config.max_multiplier);
        next.open_betting(now + self.config.betting_window_ms);
        info!(round = %next.id(), "betting open");

        self.ledger = BetLedger::new(next.id(), self.config.limits());
        self.round = next;
        self.history.push(entry);

        // The new window is open before the old round is archived.
        events.push(self.round_update(now));
        events.push(EngineEvent::HistoryAppended {
            round_id: entry.round_id,
            crash_multiplier: entry.crash_multiplier,
        });
    }

    /// Place a bet in the current round.
    pub fn place_bet(
        &mut self,
        player_id: PlayerId,
        amount: f64,
        auto_cashout_at: Option<f64>,
    ) -> Result<Bet, BetError> {
        let bet = self
            .ledger
            .place_bet(self.round.phase(), player_id, amount, auto_cashout_at)?;
        debug!(round = %self.round.id(), player = %player_id, amount, "bet placed");
        Ok(bet)
    }

    /// Cash out the player's bet at the authoritative clock's elapsed time.
    ///
    /// The elapsed time is derived here, at processing time, from the server
    /// clock. Whatever multiplier the requesting client believed was current
    /// plays no part.
    pub fn cash_out(&mut self, player_id: PlayerId) -> Result<CashoutReceipt, BetError> {
        let now = self.clock.now_ms();
        match self.round.phase() {
            RoundPhase::Running => {
                let elapsed = self.round.elapsed_at(now);
                let receipt = self.ledger.cash_out(
                    player_id,
                    &self.curve,
                    self.round.crash_elapsed_ms(),
                    elapsed,
                )?;
                debug!(
                    round = %self.round.id(),
                    player = %player_id,
                    multiplier = %format_multiplier(receipt.multiplier),
                    "manual cashout settled"
                );
                Ok(receipt)
            }
            RoundPhase::Over => match self.ledger.get(&player_id) {
                None => Err(BetError::NoActiveBet),
                Some(bet) if bet.status == BetStatus::CashedOut => {
                    Err(BetError::AlreadySettled(SettledOutcome::CashedOut {
                        multiplier: bet.cashout_multiplier.unwrap_or(1.0),
                        payout: bet.payout.unwrap_or(bet.amount),
                    }))
                }
                Some(_) => Err(BetError::RoundAlreadyCrashed),
            },
            _ => Err(BetError::NoActiveBet),
        }
    }

    /// Observer-facing snapshot of the current round.
    pub fn snapshot(&self) -> RoundSnapshot {
        self.round.snapshot()
    }

    /// Up to `limit` archived rounds, newest first.
    pub fn history(&self, limit: usize) -> Vec<HistoryEntry> {
        self.history.recent(limit)
    }

    /// The requesting player's bet in the current round, if any.
    pub fn bet_for(&self, player_id: &PlayerId) -> Option<&Bet> {
        self.ledger.get(player_id)
    }

    /// Authoritative server time, for timestamping protocol replies.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Id of the round currently in play.
    pub fn round_id(&self) -> crate::game::round::RoundId {
        self.round.id()
    }

    fn round_update(&self, now: u64) -> EngineEvent {
        EngineEvent::RoundUpdate {
            round: self.round.snapshot(),
            server_time_ms: now,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
