//! Proposal storage
//!
//! Repository interface for proposals plus the in-memory implementation
//! the service runs with.

use crate::error::{conflict_error, not_found_error, AppError};
use crate::proposal::{Proposal, ProposalStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Filter applied when listing proposals
#[derive(Debug, Clone, Copy, Default)]
pub struct ProposalFilter {
    pub status: Option<ProposalStatus>,
}

impl ProposalFilter {
    pub fn with_status(status: ProposalStatus) -> Self {
        Self { status: Some(status) }
    }

    pub fn matches(&self, proposal: &Proposal) -> bool {
        self.status.map_or(true, |s| proposal.status == s)
    }
}

/// Persistence for proposals and their embedded vote maps.
///
/// Implementations only store and load; serializing read-modify-write
/// cycles on one proposal is the caller's job.
#[async_trait]
pub trait ProposalRepository: Send + Sync {
    /// Insert a new proposal. Fails with `Conflict` if the id is taken.
    async fn create(&self, proposal: Proposal) -> Result<Proposal, AppError>;

    /// Load a proposal by id
    async fn get(&self, id: &str) -> Result<Proposal, AppError>;

    /// Replace an existing proposal
    async fn update(&self, proposal: Proposal) -> Result<Proposal, AppError>;

    /// List proposals matching the filter, oldest first
    async fn list(&self, filter: ProposalFilter) -> Result<Vec<Proposal>, AppError>;
}

/// Thread-safe in-memory proposal store
pub struct InMemoryProposalStore {
    proposals: Arc<RwLock<HashMap<String, Proposal>>>,
}

impl InMemoryProposalStore {
    pub fn new() -> Self {
        Self {
            proposals: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get proposal count
    #[allow(dead_code)]
    pub async fn count(&self) -> usize {
        let proposals = self.proposals.read().await;
        proposals.len()
    }
}

impl Default for InMemoryProposalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProposalRepository for InMemoryProposalStore {
    async fn create(&self, proposal: Proposal) -> Result<Proposal, AppError> {
        let mut proposals = self.proposals.write().await;
        if proposals.contains_key(&proposal.id) {
            return Err(conflict_error(format!("Proposal {} already exists", proposal.id)));
        }
        proposals.insert(proposal.id.clone(), proposal.clone());
        Ok(proposal)
    }

    async fn get(&self, id: &str) -> Result<Proposal, AppError> {
        let proposals = self.proposals.read().await;
        proposals
            .get(id)
            .cloned()
            .ok_or_else(|| not_found_error(format!("Proposal {} not found", id)))
    }

    async fn update(&self, proposal: Proposal) -> Result<Proposal, AppError> {
        let mut proposals = self.proposals.write().await;
        if !proposals.contains_key(&proposal.id) {
            return Err(not_found_error(format!("Proposal {} not found", proposal.id)));
        }
        proposals.insert(proposal.id.clone(), proposal.clone());
        Ok(proposal)
    }

    async fn list(&self, filter: ProposalFilter) -> Result<Vec<Proposal>, AppError> {
        let proposals = self.proposals.read().await;
        let mut matching: Vec<Proposal> = proposals
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matching)
    }
}
