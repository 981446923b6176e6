//! Proposal lifecycle derivation
//!
//! After every vote the two track results decide where a pending proposal
//! goes next:
//!
//! | synthient | human | status   | next action                 |
//! |-----------|-------|----------|-----------------------------|
//! | true      | true  | approved | execute approved changes    |
//! | true      | false | pending  | await human consensus       |
//! | false     | any   | vetoed   | vetoed by synthient track   |
//!
//! A synthient track with no votes counts as failed, so a proposal whose
//! first vote comes from the human track is vetoed immediately.

use crate::consensus::tally::{ConsensusCalculator, TrackTally};
use crate::error::AppError;
use crate::proposal::{Proposal, ProposalStatus};
use serde::Serialize;
use std::fmt;

/// What the caller should expect to happen next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum NextAction {
    ExecuteApproved,
    AwaitHumanConsensus,
    VetoedBySynthientTrack,
}

impl NextAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            NextAction::ExecuteApproved => "execute approved changes",
            NextAction::AwaitHumanConsensus => "await human consensus",
            NextAction::VetoedBySynthientTrack => "vetoed by synthient track",
        }
    }
}

impl fmt::Display for NextAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<NextAction> for String {
    fn from(action: NextAction) -> Self {
        action.as_str().to_string()
    }
}

/// Result of evaluating a proposal after a vote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ProposalStatus,
    pub to: ProposalStatus,
    pub next_action: NextAction,
    pub synthient: TrackTally,
    pub human: TrackTally,
}

impl Transition {
    /// The proposal left `pending` with this evaluation
    pub fn finalized(&self) -> bool {
        !self.from.is_terminal() && self.to.is_terminal()
    }
}

pub struct ProposalStateMachine;

impl ProposalStateMachine {
    /// Status and next action for a pair of track results
    pub fn derive(synthient_consensus: bool, human_consensus: bool) -> (ProposalStatus, NextAction) {
        match (synthient_consensus, human_consensus) {
            (true, true) => (ProposalStatus::Approved, NextAction::ExecuteApproved),
            (true, false) => (ProposalStatus::Pending, NextAction::AwaitHumanConsensus),
            (false, _) => (ProposalStatus::Vetoed, NextAction::VetoedBySynthientTrack),
        }
    }

    /// Recompute both tracks from the full vote maps and apply the derived
    /// state. Running it twice on the same votes yields the same proposal.
    pub fn evaluate(
        proposal: &mut Proposal,
        calculator: &ConsensusCalculator,
    ) -> Result<Transition, AppError> {
        if proposal.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "Proposal {} is not pending (status: {})",
                proposal.id, proposal.status
            )));
        }

        let synthient = calculator.tally_detailed(&proposal.synthient_votes);
        let human = calculator.tally_detailed(&proposal.human_votes);
        let (status, next_action) = Self::derive(synthient.passed, human.passed);

        let from = proposal.status;
        proposal.synthient_consensus = synthient.passed;
        proposal.human_consensus = human.passed;
        proposal.status = status;
        proposal.next_action = Some(next_action.to_string());

        Ok(Transition {
            from,
            to: status,
            next_action,
            synthient,
            human,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::{CastVote, Decision, VoterType};

    fn proposal_with(synthient: &[Decision], human: &[Decision]) -> Proposal {
        let mut p = Proposal::new("t".into(), "s".into(), None, None);
        for (i, d) in synthient.iter().enumerate() {
            p.record_vote(VoterType::Synthient, format!("s{}", i), CastVote::new(*d, ""));
        }
        for (i, d) in human.iter().enumerate() {
            p.record_vote(VoterType::Human, format!("h{}", i), CastVote::new(*d, ""));
        }
        p
    }

    use Decision::{Approve, Veto};

    #[test]
    fn test_derive_table() {
        assert_eq!(
            ProposalStateMachine::derive(true, true),
            (ProposalStatus::Approved, NextAction::ExecuteApproved)
        );
        assert_eq!(
            ProposalStateMachine::derive(true, false),
            (ProposalStatus::Pending, NextAction::AwaitHumanConsensus)
        );
        assert_eq!(
            ProposalStateMachine::derive(false, true),
            (ProposalStatus::Vetoed, NextAction::VetoedBySynthientTrack)
        );
        assert_eq!(
            ProposalStateMachine::derive(false, false),
            (ProposalStatus::Vetoed, NextAction::VetoedBySynthientTrack)
        );
    }

    #[test]
    fn test_synthient_veto_vetoes_proposal() {
        let mut p = proposal_with(&[Approve, Approve, Veto], &[]);
        let t = ProposalStateMachine::evaluate(&mut p, &ConsensusCalculator::default()).unwrap();

        assert!(!p.synthient_consensus);
        assert_eq!(p.status, ProposalStatus::Vetoed);
        assert!(t.finalized());
        assert_eq!(t.next_action, NextAction::VetoedBySynthientTrack);
    }

    #[test]
    fn test_synthient_pass_waits_for_humans() {
        let mut p = proposal_with(&[Approve, Approve, Approve], &[]);
        let t = ProposalStateMachine::evaluate(&mut p, &ConsensusCalculator::default()).unwrap();

        assert!(p.synthient_consensus);
        assert!(!p.human_consensus);
        assert_eq!(p.status, ProposalStatus::Pending);
        assert_eq!(p.next_action.as_deref(), Some("await human consensus"));
        assert!(!t.finalized());
    }

    #[test]
    fn test_both_tracks_approve() {
        let mut p = proposal_with(&[Approve, Approve, Approve], &[Approve, Approve, Approve]);
        ProposalStateMachine::evaluate(&mut p, &ConsensusCalculator::default()).unwrap();
        assert_eq!(p.status, ProposalStatus::Approved);
        assert!(p.consensus_reached());
    }

    #[test]
    fn test_human_vote_before_any_synthient_vote_vetoes() {
        let mut p = proposal_with(&[], &[Approve]);
        ProposalStateMachine::evaluate(&mut p, &ConsensusCalculator::default()).unwrap();
        assert_eq!(p.status, ProposalStatus::Vetoed);
        assert!(p.human_consensus);
    }

    #[test]
    fn test_human_veto_leaves_proposal_pending() {
        let mut p = proposal_with(&[Approve], &[Veto]);
        ProposalStateMachine::evaluate(&mut p, &ConsensusCalculator::default()).unwrap();
        assert_eq!(p.status, ProposalStatus::Pending);
        assert!(!p.human_consensus);
    }

    #[test]
    fn test_terminal_proposal_cannot_be_evaluated() {
        let mut p = proposal_with(&[Veto], &[]);
        let calc = ConsensusCalculator::default();
        ProposalStateMachine::evaluate(&mut p, &calc).unwrap();

        let before = p.clone();
        assert!(matches!(
            ProposalStateMachine::evaluate(&mut p, &calc),
            Err(AppError::Conflict(_))
        ));
        assert_eq!(p.status, before.status);
        assert_eq!(p.next_action, before.next_action);
    }

    #[test]
    fn test_evaluation_is_idempotent_while_pending() {
        let mut p = proposal_with(&[Approve, Approve], &[Veto]);
        let calc = ConsensusCalculator::default();
        let first = ProposalStateMachine::evaluate(&mut p, &calc).unwrap();
        let second = ProposalStateMachine::evaluate(&mut p, &calc).unwrap();
        assert_eq!(first.to, second.to);
        assert_eq!(first.synthient, second.synthient);
        assert_eq!(first.human, second.human);
    }
}
