//! Sequence-gap tracking over the inbound event stream.
//!
//! The host transport is lossy: events can vanish, duplicate, or arrive
//! late. Small gaps are tolerated as best-effort; a gap at or past the
//! threshold marks the tree stale so the owner can run a fallback reload.
//! "Stale" is a flag, not a halt - the tracker runs indefinitely.

use std::collections::VecDeque;
use tracing::warn;

/// How many recently-seen sequence numbers to remember for duplicate
/// detection. Covers well past the gap threshold without unbounded history.
const RECENT_WINDOW: usize = 64;

/// Default gap threshold triggering a fallback reload.
pub const DEFAULT_GAP_THRESHOLD: u64 = 5;

/// Verdict for one observed sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqVerdict {
    /// First event ever seen; accepted unconditionally.
    First,
    /// Exactly the next expected number.
    InOrder,
    /// Missed `n` events, below the threshold; apply anyway.
    SmallGap(u64),
    /// Missed `n >= threshold` events; the tree is now stale.
    GapExceeded(u64),
    /// Already seen or older than the newest processed event; drop.
    Duplicate,
}

#[derive(Debug)]
pub struct SequenceTracker {
    last_seq: u64,
    recent: VecDeque<u64>,
    threshold: u64,
    stale: bool,
}

impl SequenceTracker {
    pub fn new(threshold: u64) -> Self {
        Self {
            last_seq: 0,
            recent: VecDeque::with_capacity(RECENT_WINDOW),
            threshold: threshold.max(1),
            stale: false,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Clear the stale flag after a fallback reload resynchronized the tree.
    pub fn clear_stale(&mut self) {
        self.stale = false;
    }

    /// Reset history entirely (a reload swaps in a fresh event epoch).
    pub fn reset(&mut self) {
        self.last_seq = 0;
        self.recent.clear();
        self.stale = false;
    }

    /// Observe one sequence number and classify it.
    pub fn observe(&mut self, seq: u64) -> SeqVerdict {
        if self.recent.contains(&seq) || (self.last_seq != 0 && seq <= self.last_seq) {
            return SeqVerdict::Duplicate;
        }

        let verdict = if self.last_seq == 0 {
            SeqVerdict::First
        } else {
            let gap = seq - self.last_seq - 1;
            if gap == 0 {
                SeqVerdict::InOrder
            } else if gap >= self.threshold {
                warn!(gap, threshold = self.threshold, "sequence gap past threshold, tree is stale");
                self.stale = true;
                SeqVerdict::GapExceeded(gap)
            } else {
                warn!(gap, "small sequence gap, applying event anyway");
                SeqVerdict::SmallGap(gap)
            }
        };

        self.last_seq = self.last_seq.max(seq);
        if self.recent.len() == RECENT_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(seq);
        verdict
    }
}

impl Default for SequenceTracker {
    fn default() -> Self {
        Self::new(DEFAULT_GAP_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn first_event_accepted_at_any_number() {
        let mut tracker = SequenceTracker::default();
        assert_eq!(tracker.observe(907), SeqVerdict::First);
        assert_eq!(tracker.last_seq(), 907);
        assert!(!tracker.is_stale());
    }

    #[test]
    fn in_order_stream_stays_clean() {
        let mut tracker = SequenceTracker::default();
        tracker.observe(1);
        for seq in 2..20 {
            assert_eq!(tracker.observe(seq), SeqVerdict::InOrder);
        }
        assert!(!tracker.is_stale());
    }

    #[test]
    fn gap_boundary_is_exact() {
        // threshold - 1 missed events: tolerated.
        let mut tracker = SequenceTracker::new(5);
        tracker.observe(1);
        assert_eq!(tracker.observe(6), SeqVerdict::SmallGap(4));
        assert!(!tracker.is_stale());

        // exactly threshold missed events: stale.
        let mut tracker = SequenceTracker::new(5);
        tracker.observe(1);
        assert_eq!(tracker.observe(7), SeqVerdict::GapExceeded(5));
        assert!(tracker.is_stale());
    }

    #[test]
    fn duplicates_and_late_arrivals_drop() {
        let mut tracker = SequenceTracker::default();
        tracker.observe(1);
        tracker.observe(2);
        tracker.observe(3);
        assert_eq!(tracker.observe(2), SeqVerdict::Duplicate);
        assert_eq!(tracker.observe(3), SeqVerdict::Duplicate);
        // Still monotonic afterward.
        assert_eq!(tracker.observe(4), SeqVerdict::InOrder);
    }

    #[test]
    fn clear_stale_keeps_sequence_position() {
        let mut tracker = SequenceTracker::new(5);
        tracker.observe(1);
        tracker.observe(100);
        assert!(tracker.is_stale());
        tracker.clear_stale();
        assert!(!tracker.is_stale());
        assert_eq!(tracker.last_seq(), 100);
    }
}
