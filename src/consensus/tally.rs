//! Per-track consensus calculation
//!
//! A track passes when it has at least one vote, no vetoes, and enough
//! approvals to meet the threshold. The result depends only on the set of
//! votes, never on the order they were cast in.

use crate::proposal::{Decision, VoteMap};
use serde::Serialize;

/// Default fraction of a track that must approve
pub const DEFAULT_APPROVAL_THRESHOLD: f64 = 0.67;

/// Detailed result for one track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackTally {
    pub total: usize,
    pub approve: usize,
    pub veto: usize,
    /// Approvals needed for the current vote count
    pub required: usize,
    pub passed: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ConsensusCalculator {
    threshold: f64,
}

impl ConsensusCalculator {
    /// `threshold` is expected in (0, 1]; config loading enforces the range.
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Approvals needed out of `total` votes
    pub fn required_approvals(&self, total: usize) -> usize {
        (total as f64 * self.threshold).ceil() as usize
    }

    /// Pass/fail for one track
    pub fn tally(&self, votes: &VoteMap) -> bool {
        let total = votes.len();
        // No quorum with zero votes; a single veto fails the track outright
        if total == 0 || votes.values().any(|v| v.decision == Decision::Veto) {
            return false;
        }
        total >= self.required_approvals(total)
    }

    /// Counts behind `tally`, for reporting
    pub fn tally_detailed(&self, votes: &VoteMap) -> TrackTally {
        let total = votes.len();
        let veto = votes.values().filter(|v| v.decision == Decision::Veto).count();

        TrackTally {
            total,
            approve: total - veto,
            veto,
            required: self.required_approvals(total),
            passed: self.tally(votes),
        }
    }
}

impl Default for ConsensusCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_APPROVAL_THRESHOLD)
    }
}
