//! History Ring
//!
//! Bounded record of the most recent completed rounds, newest first.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::round::RoundId;

/// Archived outcome of one completed round. Immutable once appended.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// The archived round.
    pub round_id: RoundId,
    /// The multiplier the round crashed at.
    pub crash_multiplier: f64,
    /// When the round crashed.
    pub ended_at: DateTime<Utc>,
}

/// Ring of the last N completed rounds; the oldest is evicted on overflow.
#[derive(Debug)]
pub struct HistoryRing {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl HistoryRing {
    /// Create a ring holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a completed round, evicting the oldest when full.
    pub fn push(&mut self, entry: HistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front(entry);
    }

    /// Up to `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        self.entries.iter().take(limit).copied().collect()
    }

    /// All entries, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Number of archived rounds.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no round has been archived yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn entry(n: u8) -> HistoryEntry {
        HistoryEntry {
            round_id: Uuid::from_bytes([n; 16]),
            crash_multiplier: 1.0 + n as f64,
            ended_at: Utc.timestamp_millis_opt(n as i64 * 1_000).unwrap(),
        }
    }

    #[test]
    fn test_newest_first() {
        let mut ring = HistoryRing::new(10);
        ring.push(entry(1));
        ring.push(entry(2));
        ring.push(entry(3));

        let recent = ring.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0], entry(3));
        assert_eq!(recent[1], entry(2));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut ring = HistoryRing::new(3);
        for n in 1..=4 {
            ring.push(entry(n));
        }

        assert_eq!(ring.len(), 3);
        let all: Vec<_> = ring.iter().copied().collect();
        assert_eq!(all, vec![entry(4), entry(3), entry(2)]);
        // The oldest entry is gone
        assert!(!all.contains(&entry(1)));
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut ring = HistoryRing::new(5);
        for n in 0..50 {
            ring.push(entry(n));
            assert!(ring.len() <= 5);
        }
    }
}
