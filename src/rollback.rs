//! Rollback tracking for backends with non-finalized, re-orgable heads
//! (Conflux epochs today; the same structure serves any future backend
//! with the same shape of hazard).
//!
//! `lastKnownBlock` is monotonically non-decreasing except when a real
//! rollback is observed, in which case it resets to the new head and a
//! warn/error is emitted. It is a single scalar with compare-and-set
//! semantics; a stale write is acceptable since the value is advisory
//! (logging only).

use std::sync::atomic::{AtomicU64, Ordering};

pub struct RollbackState {
    last_known: AtomicU64,
}

/// Outcome of a single [`RollbackState::observe`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackObservation {
    /// `observed >= last known`: normal forward progress, no rollback.
    Advanced,
    /// `observed < last known` by less than `confirmation_epochs`: filtered
    /// rollback, log at `warn`.
    Filtered { gap: u64 },
    /// `observed < last known` by at least `confirmation_epochs`:
    /// compromising rollback, log at `error`. Processing still continues.
    Compromising { gap: u64 },
}

impl RollbackState {
    pub fn new(initial: u64) -> Self {
        Self {
            last_known: AtomicU64::new(initial),
        }
    }

    pub fn last_known(&self) -> u64 {
        self.last_known.load(Ordering::Relaxed)
    }

    /// Updates `lastKnownBlock` given a freshly observed head, returning
    /// what kind of transition (if any) occurred. `confirmation_epochs`
    /// draws the line between a filtered and a compromising rollback.
    pub fn observe(&self, observed: u64, confirmation_epochs: u64) -> RollbackObservation {
        let previous = self.last_known.swap(observed, Ordering::Relaxed);
        if observed >= previous {
            return RollbackObservation::Advanced;
        }
        let gap = previous - observed;
        if gap < confirmation_epochs {
            RollbackObservation::Filtered { gap }
        } else {
            RollbackObservation::Compromising { gap }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_monotonically() {
        let state = RollbackState::new(100);
        assert_eq!(state.observe(101, 12), RollbackObservation::Advanced);
        assert_eq!(state.last_known(), 101);
    }

    #[test]
    fn filtered_rollback_below_confirmation_gap() {
        let state = RollbackState::new(100);
        assert_eq!(
            state.observe(95, 12),
            RollbackObservation::Filtered { gap: 5 }
        );
        assert_eq!(state.last_known(), 95);
    }

    #[test]
    fn compromising_rollback_at_or_above_confirmation_gap() {
        let state = RollbackState::new(95);
        assert_eq!(
            state.observe(80, 12),
            RollbackObservation::Compromising { gap: 15 }
        );
        assert_eq!(state.last_known(), 80);
    }
}
