//! Observer Session
//!
//! Client-side reconstruction of round state from a partial event stream.
//! Recomputes the server clock offset on every authoritative message,
//! predicts the multiplier between ticks for smooth rendering, and freezes
//! when delivery stalls so a lagging client can never locally "confirm" a
//! cashout the authoritative ledger would reject.

use crate::core::curve::Curve;
use crate::game::round::{RoundPhase, RoundSnapshot};
use crate::network::protocol::ServerMessage;
use crate::TICK_INTERVAL_MS;

/// Observer-side configuration.
#[derive(Debug, Clone, Copy)]
pub struct ObserverConfig {
    /// Expected scheduler tick interval (ms).
    pub tick_interval_ms: u64,
    /// Mark the session lagging when no authoritative message arrives within
    /// this window. Conventionally a small multiple of the tick interval.
    pub lag_after_ms: u64,
    /// The curve to predict with; must match the server's.
    pub curve: Curve,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: TICK_INTERVAL_MS,
            lag_after_ms: 500,
            curve: Curve::default(),
        }
    }
}

/// One observer's reconciled view of the authoritative round.
#[derive(Debug)]
pub struct ObserverSession {
    config: ObserverConfig,
    /// Authoritative server time minus local receive time, recomputed on
    /// every timestamped message.
    offset_ms: i64,
    round: Option<RoundSnapshot>,
    /// Round start in server time, reconciled from updates and ticks.
    started_at_ms: Option<u64>,
    /// Last multiplier the server certified; prediction never survives a
    /// disagreement with it.
    last_multiplier: f64,
    /// Local receive time of the last authoritative message.
    last_received_at: Option<u64>,
}

impl ObserverSession {
    /// Create a session that has heard nothing yet.
    pub fn new(config: ObserverConfig) -> Self {
        Self {
            config,
            offset_ms: 0,
            round: None,
            started_at_ms: None,
            last_multiplier: 1.0,
            last_received_at: None,
        }
    }

    /// Ingest a server message received at `local_now_ms`.
    pub fn on_message(&mut self, message: &ServerMessage, local_now_ms: u64) {
        match message {
            ServerMessage::RoundUpdate { round, server_time } => {
                self.reconcile(*server_time, local_now_ms);

                let round_changed = self.round.map(|r| r.id) != Some(round.id);
                if round_changed {
                    self.started_at_ms = None;
                    self.last_multiplier = 1.0;
                }

                match round.phase {
                    RoundPhase::Running => {
                        self.started_at_ms = round.started_at;
                        if let Some(start) = round.started_at {
                            let elapsed = server_time.saturating_sub(start);
                            if let Ok(m) = self.config.curve.multiplier_at(elapsed) {
                                self.last_multiplier = m;
                            }
                        }
                    }
                    RoundPhase::Over => {
                        if let Some(crash) = round.crash_multiplier {
                            self.last_multiplier = crash;
                        }
                    }
                    _ => {
                        self.last_multiplier = 1.0;
                    }
                }

                self.round = Some(*round);
            }

            ServerMessage::MultiplierTick {
                round_id,
                elapsed,
                multiplier,
                server_time,
            } => {
                self.reconcile(*server_time, local_now_ms);
                if self.round.map(|r| r.id) == Some(*round_id) {
                    // Snap to the authoritative value, even when it is lower
                    // than what prediction showed a moment ago.
                    self.started_at_ms = Some(server_time.saturating_sub(*elapsed));
                    self.last_multiplier = *multiplier;
                }
            }

            ServerMessage::Pong { server_time, .. } => {
                self.reconcile(*server_time, local_now_ms);
            }

            _ => {}
        }
    }

    fn reconcile(&mut self, server_time_ms: u64, local_now_ms: u64) {
        self.offset_ms = server_time_ms as i64 - local_now_ms as i64;
        self.last_received_at = Some(local_now_ms);
    }

    /// Signed server-minus-local clock offset from the latest message.
    pub fn offset_ms(&self) -> i64 {
        self.offset_ms
    }

    /// The last round snapshot received.
    pub fn round(&self) -> Option<&RoundSnapshot> {
        self.round.as_ref()
    }

    /// Whether delivery has stalled past the configured window.
    pub fn lagging(&self, local_now_ms: u64) -> bool {
        match self.last_received_at {
            Some(received) => local_now_ms.saturating_sub(received) > self.config.lag_after_ms,
            // Nothing authoritative yet: nothing is safe to extrapolate.
            None => true,
        }
    }

    /// The multiplier to display at `local_now_ms`.
    ///
    /// Between ticks this projects the curve through the reconciled clock
    /// offset. While lagging it freezes at the last authoritative value
    /// instead of extrapolating further.
    pub fn predicted_multiplier(&self, local_now_ms: u64) -> f64 {
        let Some(round) = &self.round else {
            return self.last_multiplier;
        };
        if round.phase != RoundPhase::Running {
            return self.last_multiplier;
        }
        if self.lagging(local_now_ms) {
            return self.last_multiplier;
        }
        let Some(start) = self.started_at_ms else {
            return self.last_multiplier;
        };

        let server_now = local_now_ms.saturating_add_signed(self.offset_ms);
        let elapsed = server_now.saturating_sub(start);
        self.config
            .curve
            .multiplier_at(elapsed)
            .unwrap_or(self.last_multiplier)
    }

    /// Whether a local auto-cashout at `threshold` should fire now.
    ///
    /// Suppressed entirely while lagging: a stalled session must wait for a
    /// fresh authoritative snapshot before trusting its own projection.
    pub fn auto_cashout_due(&self, threshold: f64, local_now_ms: u64) -> bool {
        if self.lagging(local_now_ms) {
            return false;
        }
        match &self.round {
            Some(round) if round.phase == RoundPhase::Running => {
                self.predicted_multiplier(local_now_ms) >= threshold
            }
            _ => false,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
