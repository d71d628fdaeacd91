//! Round State Machine
//!
//! One play cycle from bet-taking through crash. The crash outcome is fixed
//! at creation and never recomputed; observers only learn it at `Over`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque round identifier.
pub type RoundId = Uuid;

/// Lifecycle phase of a round.
///
/// A single linear cycle with no skip transitions:
/// `Loading -> TakingBets -> Running -> Over`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// Constructed, crash point drawn, not yet visible to observers.
    Loading,
    /// Betting window open.
    TakingBets,
    /// Multiplier climbing; `started_at` stamped.
    Running,
    /// Crashed. Terminal and immutable except for archival.
    Over,
}

/// One round of the crash game.
#[derive(Clone, Debug)]
pub struct Round {
    id: RoundId,
    phase: RoundPhase,
    /// Elapsed milliseconds at which Running ends. Fixed at creation.
    crash_elapsed_ms: u64,
    /// `curve(crash_elapsed_ms)`, revealed at Over. Fixed at creation.
    crash_multiplier: f64,
    betting_closes_at: Option<u64>,
    started_at: Option<u64>,
    ended_at: Option<u64>,
}

impl Round {
    /// Construct a round in `Loading` with its outcome already fixed.
    pub fn new(crash_elapsed_ms: u64, crash_multiplier: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: RoundPhase::Loading,
            crash_elapsed_ms,
            crash_multiplier,
            betting_closes_at: None,
            started_at: None,
            ended_at: None,
        }
    }

    /// Round identifier.
    pub fn id(&self) -> RoundId {
        self.id
    }

    /// Current phase.
    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    /// The crash instant, in elapsed milliseconds. Crate-internal: observers
    /// must not learn it before `Over`.
    pub(crate) fn crash_elapsed_ms(&self) -> u64 {
        self.crash_elapsed_ms
    }

    /// The crash multiplier. Crate-internal until revealed via snapshot.
    pub(crate) fn crash_multiplier(&self) -> f64 {
        self.crash_multiplier
    }

    /// Authoritative start timestamp, present while Running/Over.
    pub fn started_at(&self) -> Option<u64> {
        self.started_at
    }

    /// When the betting window closes, present while TakingBets.
    pub fn betting_closes_at(&self) -> Option<u64> {
        self.betting_closes_at
    }

    /// When the round crashed, present at Over.
    pub fn ended_at(&self) -> Option<u64> {
        self.ended_at
    }

    /// `Loading -> TakingBets`; opens the betting window until `closes_at`.
    pub(crate) fn open_betting(&mut self, closes_at: u64) {
        debug_assert_eq!(self.phase, RoundPhase::Loading);
        self.phase = RoundPhase::TakingBets;
        self.betting_closes_at = Some(closes_at);
    }

    /// `TakingBets -> Running`; stamps `started_at` with the authoritative clock.
    pub(crate) fn start(&mut self, now_ms: u64) {
        debug_assert_eq!(self.phase, RoundPhase::TakingBets);
        self.phase = RoundPhase::Running;
        self.started_at = Some(now_ms);
    }

    /// `Running -> Over`; the multiplier freezes at the precomputed crash value.
    pub(crate) fn crash(&mut self, now_ms: u64) {
        debug_assert_eq!(self.phase, RoundPhase::Running);
        self.phase = RoundPhase::Over;
        self.ended_at = Some(now_ms);
    }

    /// Authoritative elapsed time at `now_ms`.
    ///
    /// Frozen at the crash instant once Over; zero before Running.
    pub fn elapsed_at(&self, now_ms: u64) -> u64 {
        match self.phase {
            RoundPhase::Over => self.crash_elapsed_ms,
            RoundPhase::Running => self
                .started_at
                .map(|start| now_ms.saturating_sub(start))
                .unwrap_or(0),
            _ => 0,
        }
    }

    /// Observer-facing view. Hides the crash point until the round is Over.
    pub fn snapshot(&self) -> RoundSnapshot {
        RoundSnapshot {
            id: self.id,
            phase: self.phase,
            betting_closes_at: self.betting_closes_at,
            started_at: self.started_at,
            crash_multiplier: (self.phase == RoundPhase::Over).then_some(self.crash_multiplier),
        }
    }
}

/// Public view of a round, safe to broadcast in any phase.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    /// Round identifier.
    pub id: RoundId,
    /// Current phase.
    pub phase: RoundPhase,
    /// Betting deadline (server time, ms), while TakingBets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub betting_closes_at: Option<u64>,
    /// Authoritative start timestamp, once Running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    /// Revealed crash multiplier, only at Over.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crash_multiplier: Option<f64>,
}
