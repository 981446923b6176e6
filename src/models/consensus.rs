//! Consensus request/response models

use crate::audit::AuditEntry;
use crate::auth::Role;
use crate::consensus::reporter::VoteTally;
use crate::consensus::{Ballot, VoteOutcome};
use crate::error::AppError;
use crate::proposal::{NewProposal, Proposal, ProposalStatus};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

static VOTER_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:@-]{0,127}$").expect("voter id pattern is valid")
});

/// Request to create a proposal
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProposalRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "title must be between 1 and 200 characters"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "summary is required"))]
    pub summary: String,
    pub details: Option<String>,
    #[validate(custom(function = "validate_voter_id"))]
    pub proposer_id: Option<String>,
}

impl From<CreateProposalRequest> for NewProposal {
    fn from(req: CreateProposalRequest) -> Self {
        NewProposal {
            title: req.title,
            summary: req.summary,
            details: req.details,
            proposer_id: req.proposer_id,
        }
    }
}

/// Request to cast a vote. Enum-valued fields arrive as text so that an
/// unknown value is reported as a validation error.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CastVoteRequest {
    #[serde(default)]
    #[validate(custom(function = "validate_voter_id"))]
    pub voter_id: String,
    #[serde(default)]
    pub voter_type: String,
    #[serde(default)]
    pub vote: String,
    #[validate(length(max = 2000, message = "rationale must be at most 2000 characters"))]
    pub rationale: Option<String>,
}

impl CastVoteRequest {
    pub fn into_ballot(self, proposal_id: &str) -> Result<Ballot, AppError> {
        Ballot::parse(
            proposal_id,
            &self.voter_id,
            &self.voter_type,
            &self.vote,
            self.rationale.as_deref(),
        )
    }
}

/// Voter ids: alphanumeric start, then alphanumerics and `_ . : @ -`
fn validate_voter_id(id: &str) -> Result<(), validator::ValidationError> {
    if !VOTER_ID.is_match(id) {
        let mut err = validator::ValidationError::new("invalid_voter_id");
        err.message = Some(
            "voterId must start with a letter or digit and contain at most 128 of [A-Za-z0-9_.:@-]".into(),
        );
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct ProposalListQuery {
    pub status: Option<String>,
}

impl ProposalListQuery {
    pub fn status(&self) -> Result<Option<ProposalStatus>, AppError> {
        self.status
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(str::parse)
            .transpose()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProposalResponse {
    pub id: String,
    pub status: ProposalStatus,
    pub proposal: Proposal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponse {
    pub consensus_reached: bool,
    pub next_action: String,
    pub proposal: Proposal,
}

impl From<VoteOutcome> for VoteResponse {
    fn from(outcome: VoteOutcome) -> Self {
        Self {
            consensus_reached: outcome.consensus_reached,
            next_action: outcome.next_action.to_string(),
            proposal: outcome.proposal,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalListResponse {
    pub proposals: Vec<Proposal>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteTalliesResponse {
    pub role: Role,
    pub tallies: Vec<VoteTally>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogResponse {
    pub proposal_id: String,
    pub entries: Vec<AuditEntry>,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::MAX_TITLE_LEN;

    fn vote_request(voter_id: &str) -> CastVoteRequest {
        CastVoteRequest {
            voter_id: voter_id.to_string(),
            voter_type: "synthient".to_string(),
            vote: "approve".to_string(),
            rationale: None,
        }
    }

    #[test]
    fn test_voter_id_pattern() {
        assert!(vote_request("synth-1").validate().is_ok());
        assert!(vote_request("alice@example.org").validate().is_ok());
        assert!(vote_request("").validate().is_err());
        assert!(vote_request("-leading-dash").validate().is_err());
        assert!(vote_request("has space").validate().is_err());
        assert!(vote_request(&"x".repeat(129)).validate().is_err());
    }

    #[test]
    fn test_missing_fields_deserialize_as_empty() {
        let req: CastVoteRequest = serde_json::from_str(r#"{"voterId": "s1"}"#).unwrap();
        assert!(matches!(req.into_ballot("p1"), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_create_request_length_limits() {
        let req = CreateProposalRequest {
            title: "x".repeat(MAX_TITLE_LEN + 1),
            summary: "s".into(),
            details: None,
            proposer_id: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_list_query_status() {
        let q = ProposalListQuery { status: Some("approved".into()) };
        assert_eq!(q.status().unwrap(), Some(ProposalStatus::Approved));
        let q = ProposalListQuery { status: Some("".into()) };
        assert_eq!(q.status().unwrap(), None);
        let q = ProposalListQuery { status: Some("bogus".into()) };
        assert!(q.status().is_err());
    }
}
