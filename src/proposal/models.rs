//! Proposal data models
//!
//! Defines proposals, the two voting tracks, and the votes cast on them.

use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Proposal status in the consensus lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    /// Accepting votes
    #[default]
    Pending,
    /// Both tracks reached consensus
    Approved,
    /// Closed without approval
    Rejected,
    /// Synthient track failed
    Vetoed,
}

impl ProposalStatus {
    /// Terminal states never accept further votes
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProposalStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Approved => "approved",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::Vetoed => "vetoed",
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ProposalStatus::Pending),
            "approved" => Ok(ProposalStatus::Approved),
            "rejected" => Ok(ProposalStatus::Rejected),
            "vetoed" => Ok(ProposalStatus::Vetoed),
            other => Err(AppError::Validation(format!(
                "Invalid status '{}': expected pending, approved, rejected or vetoed",
                other
            ))),
        }
    }
}

/// The two independent voter classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoterType {
    /// Automated agents
    Synthient,
    /// Human reviewers
    Human,
}

impl VoterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoterType::Synthient => "synthient",
            VoterType::Human => "human",
        }
    }
}

impl fmt::Display for VoterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoterType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "synthient" => Ok(VoterType::Synthient),
            "human" => Ok(VoterType::Human),
            "" => Err(AppError::Validation("voterType is required".to_string())),
            other => Err(AppError::Validation(format!(
                "Invalid voterType '{}': expected synthient or human",
                other
            ))),
        }
    }
}

/// A vote value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    /// Fails the whole track regardless of approvals
    Veto,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Veto => "veto",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(Decision::Approve),
            "veto" => Ok(Decision::Veto),
            "" => Err(AppError::Validation("vote is required".to_string())),
            other => Err(AppError::Validation(format!(
                "Invalid vote '{}': expected approve or veto",
                other
            ))),
        }
    }
}

/// A vote as persisted inside a proposal's track map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastVote {
    pub decision: Decision,
    #[serde(default)]
    pub rationale: String,
    pub cast_at: DateTime<Utc>,
}

impl CastVote {
    pub fn new(decision: Decision, rationale: impl Into<String>) -> Self {
        Self {
            decision,
            rationale: rationale.into(),
            cast_at: Utc::now(),
        }
    }
}

/// voterId -> vote, ordered by voter id
pub type VoteMap = BTreeMap<String, CastVote>;

/// A proposal voted on by both tracks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: String,
    pub title: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposer_id: Option<String>,
    pub status: ProposalStatus,
    pub synthient_votes: VoteMap,
    pub human_votes: VoteMap,
    pub synthient_consensus: bool,
    pub human_consensus: bool,
    /// Hint from the most recent state evaluation
    pub next_action: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Proposal {
    pub fn new(
        title: String,
        summary: String,
        details: Option<String>,
        proposer_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            summary,
            details,
            proposer_id,
            status: ProposalStatus::Pending,
            synthient_votes: VoteMap::new(),
            human_votes: VoteMap::new(),
            synthient_consensus: false,
            human_consensus: false,
            next_action: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Votes cast on one track
    pub fn votes(&self, track: VoterType) -> &VoteMap {
        match track {
            VoterType::Synthient => &self.synthient_votes,
            VoterType::Human => &self.human_votes,
        }
    }

    pub fn has_voted(&self, track: VoterType, voter_id: &str) -> bool {
        self.votes(track).contains_key(voter_id)
    }

    /// Insert a vote into its track. Returns false (and leaves the map
    /// untouched) when the voter already has a vote on that track.
    pub fn record_vote(&mut self, track: VoterType, voter_id: String, vote: CastVote) -> bool {
        let map = match track {
            VoterType::Synthient => &mut self.synthient_votes,
            VoterType::Human => &mut self.human_votes,
        };
        if map.contains_key(&voter_id) {
            return false;
        }
        self.updated_at = vote.cast_at;
        map.insert(voter_id, vote);
        true
    }

    /// Both tracks currently pass
    pub fn consensus_reached(&self) -> bool {
        self.synthient_consensus && self.human_consensus
    }
}
