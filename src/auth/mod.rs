//! Caller identity and role-based authorization
//!
//! Authentication happens upstream; this service only consumes the resolved
//! caller identity and role.

mod middleware;

pub use middleware::{
    identity_middleware, HeaderIdentityResolver, IdentityResolver, ACTOR_ID_HEADER, ACTOR_ROLE_HEADER,
};

use crate::error::AppError;
use crate::proposal::VoterType;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Consensus roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Votes on the human track
    HumanConsensus,
    /// Votes on the synthient track
    SynthientConsensus,
    /// Read-only consumer of finalized decisions
    AgentView,
}

impl Role {
    pub fn can_vote_on(&self, track: VoterType) -> bool {
        matches!(
            (self, track),
            (Role::HumanConsensus, VoterType::Human) | (Role::SynthientConsensus, VoterType::Synthient)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::HumanConsensus => "human-consensus",
            Role::SynthientConsensus => "synthient-consensus",
            Role::AgentView => "agent-view",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::AgentView
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human-consensus" => Ok(Role::HumanConsensus),
            "synthient-consensus" | "sentient-consensus" => Ok(Role::SynthientConsensus),
            "agent-view" => Ok(Role::AgentView),
            other => Err(AppError::Validation(format!("Unknown role '{}'", other))),
        }
    }
}

/// The resolved identity of whoever made the request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub actor_id: Option<String>,
    pub role: Option<Role>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_role(actor_id: impl Into<String>, role: Role) -> Self {
        Self {
            actor_id: Some(actor_id.into()),
            role: Some(role),
        }
    }

    /// Role used on read paths; callers without one get the narrowest view
    pub fn effective_role(&self) -> Role {
        self.role.unwrap_or_default()
    }

    /// Require that the caller may cast a vote on `track`.
    /// Callers without a resolved role are not restricted.
    pub fn authorize_vote(&self, track: VoterType) -> Result<(), AppError> {
        match self.role {
            Some(role) if !role.can_vote_on(track) => Err(AppError::Forbidden(format!(
                "Role {} cannot vote on the {} track",
                role, track
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_track_permissions() {
        assert!(Role::HumanConsensus.can_vote_on(VoterType::Human));
        assert!(!Role::HumanConsensus.can_vote_on(VoterType::Synthient));
        assert!(Role::SynthientConsensus.can_vote_on(VoterType::Synthient));
        assert!(!Role::AgentView.can_vote_on(VoterType::Human));
        assert!(!Role::AgentView.can_vote_on(VoterType::Synthient));
    }

    #[test]
    fn test_authorize_vote() {
        let human = Caller::with_role("alice", Role::HumanConsensus);
        assert!(human.authorize_vote(VoterType::Human).is_ok());
        assert!(matches!(
            human.authorize_vote(VoterType::Synthient),
            Err(AppError::Forbidden(_))
        ));
        assert!(Caller::anonymous().authorize_vote(VoterType::Synthient).is_ok());
    }

    #[test]
    fn test_parse_role() {
        assert_eq!("agent-view".parse::<Role>().unwrap(), Role::AgentView);
        assert_eq!("Sentient-Consensus".parse::<Role>().unwrap(), Role::SynthientConsensus);
        assert!("admin".parse::<Role>().is_err());
    }
}
