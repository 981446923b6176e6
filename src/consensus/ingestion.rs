//! Vote ingestion
//!
//! The only write path for vote maps. Each vote runs
//! validate -> mutate -> recompute -> persist while holding the proposal's
//! lock; the audit entry is written after the lock is released.

use crate::audit::{AuditAction, AuditLogger};
use crate::auth::Caller;
use crate::consensus::locks::ProposalLocks;
use crate::consensus::state_machine::{NextAction, ProposalStateMachine, Transition};
use crate::consensus::tally::ConsensusCalculator;
use crate::error::{conflict_error, AppError};
use crate::proposal::{CastVote, Decision, Proposal, ProposalRepository, ProposalStatus, VoterType};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

/// A validated vote request
#[derive(Debug, Clone)]
pub struct Ballot {
    pub proposal_id: String,
    pub voter_id: String,
    pub voter_type: VoterType,
    pub decision: Decision,
    pub rationale: String,
}

impl Ballot {
    /// Parse raw request fields. Fails with `Validation` on a blank voter id
    /// or an unknown voter type / decision.
    pub fn parse(
        proposal_id: &str,
        voter_id: &str,
        voter_type: &str,
        decision: &str,
        rationale: Option<&str>,
    ) -> Result<Self, AppError> {
        let voter_id = voter_id.trim();
        if voter_id.is_empty() {
            return Err(AppError::Validation("voterId is required".to_string()));
        }
        Ok(Self {
            proposal_id: proposal_id.trim().to_string(),
            voter_id: voter_id.to_string(),
            voter_type: voter_type.parse()?,
            decision: decision.parse()?,
            rationale: rationale.unwrap_or_default().trim().to_string(),
        })
    }
}

/// Result of a successful vote
#[derive(Debug, Clone)]
pub struct VoteOutcome {
    pub proposal: Proposal,
    pub consensus_reached: bool,
    pub next_action: NextAction,
}

pub struct VoteIngestion {
    store: Arc<dyn ProposalRepository>,
    locks: ProposalLocks,
    calculator: ConsensusCalculator,
    audit: AuditLogger,
}

impl VoteIngestion {
    pub fn new(store: Arc<dyn ProposalRepository>, calculator: ConsensusCalculator, audit: AuditLogger) -> Self {
        Self {
            store,
            locks: ProposalLocks::new(),
            calculator,
            audit,
        }
    }

    pub async fn submit_vote(&self, caller: &Caller, ballot: Ballot) -> Result<VoteOutcome, AppError> {
        caller.authorize_vote(ballot.voter_type)?;

        // Unknown ids fail here, before a lock entry is created for them
        self.store.get(&ballot.proposal_id).await?;

        let (proposal, transition) = {
            let _guard = self.locks.acquire(&ballot.proposal_id).await;

            let mut proposal = self.store.get(&ballot.proposal_id).await?;
            if proposal.status != ProposalStatus::Pending {
                return Err(conflict_error(format!(
                    "Proposal {} is not pending (status: {})",
                    proposal.id, proposal.status
                )));
            }
            if proposal.has_voted(ballot.voter_type, &ballot.voter_id) {
                return Err(conflict_error(format!(
                    "duplicate vote: {} has already voted on the {} track",
                    ballot.voter_id, ballot.voter_type
                )));
            }

            proposal.record_vote(
                ballot.voter_type,
                ballot.voter_id.clone(),
                CastVote::new(ballot.decision, ballot.rationale.clone()),
            );
            let transition = ProposalStateMachine::evaluate(&mut proposal, &self.calculator)?;
            let proposal = self.store.update(proposal).await?;
            (proposal, transition)
        };

        debug!(
            proposal_id = %proposal.id,
            voter_id = %ballot.voter_id,
            track = %ballot.voter_type,
            decision = %ballot.decision,
            status = %proposal.status,
            "Vote recorded"
        );

        self.record_audit(caller, &ballot, &proposal, &transition).await;

        Ok(VoteOutcome {
            consensus_reached: proposal.consensus_reached(),
            next_action: transition.next_action,
            proposal,
        })
    }

    async fn record_audit(&self, caller: &Caller, ballot: &Ballot, proposal: &Proposal, transition: &Transition) {
        let actor = caller.actor_id.as_deref().unwrap_or(&ballot.voter_id);

        self.audit
            .append(
                AuditAction::VoteCast,
                Some(actor),
                &proposal.id,
                json!({
                    "voterId": ballot.voter_id,
                    "voterType": ballot.voter_type,
                    "decision": ballot.decision,
                    "rationale": ballot.rationale,
                    "synthientConsensus": proposal.synthient_consensus,
                    "humanConsensus": proposal.human_consensus,
                    "status": proposal.status,
                }),
            )
            .await;

        if transition.finalized() {
            let instructions = match transition.to {
                ProposalStatus::Approved => "Execute the proposed changes as approved",
                _ => "Reject the proposed changes and keep the current system state",
            };
            info!(
                "Proposal {} finalized: {} -> {}",
                proposal.id, transition.from, transition.to
            );
            self.audit
                .append(
                    AuditAction::ProposalFinalized,
                    Some(actor),
                    &proposal.id,
                    json!({
                        "from": transition.from,
                        "to": transition.to,
                        "nextAction": transition.next_action,
                        "instructions": instructions,
                        "synthient": transition.synthient,
                        "human": transition.human,
                    }),
                )
                .await;
        }
    }
}
