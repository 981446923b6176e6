//! Read-only tally reporting for dashboards and CLIs
//!
//! Never mutates the store. What a caller may see is decided by a single
//! `Visibility` value derived from their role.

use crate::audit::{AuditAction, AuditEntry};
use crate::auth::Role;
use crate::consensus::state_machine::ProposalStateMachine;
use crate::consensus::tally::{ConsensusCalculator, TrackTally};
use crate::error::{not_found_error, AppError};
use crate::proposal::{
    Decision, Proposal, ProposalFilter, ProposalRepository, ProposalStatus, VoteMap, VoterType,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Which proposals and voter identities a role may see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visibility {
    /// Restrict listings to proposals in this status
    pub status: Option<ProposalStatus>,
    pub synthient_identities: bool,
    pub human_identities: bool,
}

impl Visibility {
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::HumanConsensus => Self {
                status: None,
                synthient_identities: true,
                human_identities: true,
            },
            Role::SynthientConsensus => Self {
                status: None,
                synthient_identities: true,
                human_identities: false,
            },
            // Agents only consume finalized approvals
            Role::AgentView => Self {
                status: Some(ProposalStatus::Approved),
                synthient_identities: false,
                human_identities: false,
            },
        }
    }

    pub fn admits(&self, proposal: &Proposal) -> bool {
        self.status.map_or(true, |s| proposal.status == s)
    }

    pub fn identities(&self, track: VoterType) -> bool {
        match track {
            VoterType::Synthient => self.synthient_identities,
            VoterType::Human => self.human_identities,
        }
    }

    /// Replace voter ids on hidden tracks with placeholders. Decisions,
    /// rationales and counts are kept.
    pub fn redact(&self, mut proposal: Proposal) -> Proposal {
        if !self.synthient_identities {
            proposal.synthient_votes = anonymize(std::mem::take(&mut proposal.synthient_votes));
        }
        if !self.human_identities {
            proposal.human_votes = anonymize(std::mem::take(&mut proposal.human_votes));
        }
        proposal
    }

    /// Drop voter identities from an audit entry about a hidden track
    pub fn redact_entry(&self, entry: &mut AuditEntry) {
        let visible = match entry.action {
            AuditAction::ProposalCreated => true,
            AuditAction::VoteCast => entry
                .payload
                .get("voterType")
                .and_then(|t| t.as_str())
                .and_then(|t| t.parse::<VoterType>().ok())
                .map_or(false, |track| self.identities(track)),
            // The finalizing voter may sit on either track
            AuditAction::ProposalFinalized => self.synthient_identities && self.human_identities,
        };

        if !visible {
            entry.actor_id = None;
            if let Some(payload) = entry.payload.as_object_mut() {
                payload.remove("voterId");
            }
        }
    }
}

fn anonymize(votes: VoteMap) -> VoteMap {
    votes
        .into_values()
        .enumerate()
        .map(|(i, vote)| (format!("redacted-{:03}", i + 1), vote))
        .collect()
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VoterEntry {
    pub voter_id: String,
    pub decision: Decision,
}

/// One track's counts, with voter identities when visible
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackReport {
    #[serde(flatten)]
    pub tally: TrackTally,
    /// `None` when identities are redacted for the requester
    pub voters: Option<Vec<VoterEntry>>,
}

impl TrackReport {
    fn build(calculator: &ConsensusCalculator, votes: &VoteMap, show_identities: bool) -> Self {
        let voters = show_identities.then(|| {
            votes
                .iter()
                .map(|(voter_id, vote)| VoterEntry {
                    voter_id: voter_id.clone(),
                    decision: vote.decision,
                })
                .collect()
        });
        Self {
            tally: calculator.tally_detailed(votes),
            voters,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteTally {
    pub proposal_id: String,
    pub proposal_title: String,
    pub status: ProposalStatus,
    pub synthient_votes: TrackReport,
    pub human_votes: TrackReport,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TallyMetrics {
    pub synthient: TrackTally,
    pub human: TrackTally,
    pub threshold: f64,
    /// approve / total across both tracks, 0 when nothing was cast
    pub approval_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusStatus {
    pub status: ProposalStatus,
    pub synthient_consensus: bool,
    pub human_consensus: bool,
    pub consensus_reached: bool,
    pub next_action: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalTally {
    pub proposal: Proposal,
    pub metrics: TallyMetrics,
    pub consensus_status: ConsensusStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct VoteStats {
    pub total: usize,
    pub approve: usize,
    pub veto: usize,
}

impl VoteStats {
    fn add(&mut self, votes: &VoteMap) {
        for vote in votes.values() {
            self.total += 1;
            match vote.decision {
                Decision::Approve => self.approve += 1,
                Decision::Veto => self.veto += 1,
            }
        }
    }

    /// Share of approvals in percent
    pub fn trust_score(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.approve as f64 / self.total as f64 * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrustScores {
    pub human: f64,
    pub synthient: f64,
    pub overall: f64,
}

/// Aggregate figures across every proposal
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusMetrics {
    pub human_votes: VoteStats,
    pub synthient_votes: VoteStats,
    pub trust_scores: TrustScores,
    pub proposals_by_status: StatusCounts,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub vetoed: usize,
}

pub struct TallyReporter {
    store: Arc<dyn ProposalRepository>,
    calculator: ConsensusCalculator,
}

impl TallyReporter {
    pub fn new(store: Arc<dyn ProposalRepository>, calculator: ConsensusCalculator) -> Self {
        Self { store, calculator }
    }

    /// One proposal as `role` may see it. Proposals outside the role's
    /// view are reported as missing.
    pub async fn get_proposal(&self, id: &str, role: Role) -> Result<Proposal, AppError> {
        let visibility = Visibility::for_role(role);
        let proposal = self.store.get(id).await?;
        if !visibility.admits(&proposal) {
            return Err(not_found_error(format!("Proposal {} not found", id)));
        }
        Ok(visibility.redact(proposal))
    }

    pub async fn list_proposals(&self, filter: ProposalFilter, role: Role) -> Result<Vec<Proposal>, AppError> {
        let visibility = Visibility::for_role(role);
        Ok(self
            .store
            .list(filter)
            .await?
            .into_iter()
            .filter(|p| visibility.admits(p))
            .map(|p| visibility.redact(p))
            .collect())
    }

    /// Counts, consensus flags, and next action for one proposal
    pub async fn proposal_tally(&self, id: &str, role: Role) -> Result<ProposalTally, AppError> {
        let proposal = self.get_proposal(id, role).await?;
        let synthient = self.calculator.tally_detailed(&proposal.synthient_votes);
        let human = self.calculator.tally_detailed(&proposal.human_votes);

        let cast = synthient.total + human.total;
        let approval_rate = if cast == 0 {
            0.0
        } else {
            (synthient.approve + human.approve) as f64 / cast as f64
        };

        // Before the first vote there is no evaluation to report
        let next_action = proposal.next_action.clone().or_else(|| {
            (synthient.total + human.total > 0).then(|| {
                ProposalStateMachine::derive(synthient.passed, human.passed).1.to_string()
            })
        });

        Ok(ProposalTally {
            metrics: TallyMetrics {
                synthient,
                human,
                threshold: self.calculator.threshold(),
                approval_rate,
            },
            consensus_status: ConsensusStatus {
                status: proposal.status,
                synthient_consensus: proposal.synthient_consensus,
                human_consensus: proposal.human_consensus,
                consensus_reached: proposal.consensus_reached(),
                next_action,
            },
            proposal,
        })
    }

    /// Per-proposal tallies, filtered and redacted for `role`
    pub async fn get_vote_tallies(&self, role: Role) -> Result<Vec<VoteTally>, AppError> {
        let visibility = Visibility::for_role(role);
        let proposals = self.store.list(ProposalFilter::default()).await?;

        Ok(proposals
            .iter()
            .filter(|p| visibility.admits(p))
            .map(|p| VoteTally {
                proposal_id: p.id.clone(),
                proposal_title: p.title.clone(),
                status: p.status,
                synthient_votes: TrackReport::build(
                    &self.calculator,
                    &p.synthient_votes,
                    visibility.synthient_identities,
                ),
                human_votes: TrackReport::build(&self.calculator, &p.human_votes, visibility.human_identities),
                last_updated: p.updated_at,
            })
            .collect())
    }

    pub async fn consensus_metrics(&self) -> Result<ConsensusMetrics, AppError> {
        let proposals = self.store.list(ProposalFilter::default()).await?;

        let mut human_votes = VoteStats::default();
        let mut synthient_votes = VoteStats::default();
        let mut by_status = StatusCounts::default();

        for p in &proposals {
            human_votes.add(&p.human_votes);
            synthient_votes.add(&p.synthient_votes);
            match p.status {
                ProposalStatus::Pending => by_status.pending += 1,
                ProposalStatus::Approved => by_status.approved += 1,
                ProposalStatus::Rejected => by_status.rejected += 1,
                ProposalStatus::Vetoed => by_status.vetoed += 1,
            }
        }

        let human = human_votes.trust_score();
        let synthient = synthient_votes.trust_score();

        Ok(ConsensusMetrics {
            human_votes,
            synthient_votes,
            trust_scores: TrustScores {
                human,
                synthient,
                overall: (human + synthient) / 2.0,
            },
            proposals_by_status: by_status,
            last_updated: Utc::now(),
        })
    }
}
