//! Proposal intake
//!
//! Validates new proposals, consults the zeroth-gate, and stores them in
//! `pending` with empty vote maps.

use crate::audit::{AuditAction, AuditLogger};
use crate::auth::Caller;
use crate::error::AppError;
use crate::proposal::{Proposal, ProposalRepository, ZerothGate};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

pub const MAX_TITLE_LEN: usize = 200;

/// Input for a new proposal
#[derive(Debug, Clone)]
pub struct NewProposal {
    pub title: String,
    pub summary: String,
    pub details: Option<String>,
    pub proposer_id: Option<String>,
}

impl NewProposal {
    fn validate(&self) -> Result<(), AppError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("title is required".to_string()));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(AppError::Validation(format!(
                "title must be at most {} characters",
                MAX_TITLE_LEN
            )));
        }
        if self.summary.trim().is_empty() {
            return Err(AppError::Validation("summary is required".to_string()));
        }
        Ok(())
    }
}

pub struct ProposalIntake {
    store: Arc<dyn ProposalRepository>,
    gate: Arc<dyn ZerothGate>,
    audit: AuditLogger,
}

impl ProposalIntake {
    pub fn new(store: Arc<dyn ProposalRepository>, gate: Arc<dyn ZerothGate>, audit: AuditLogger) -> Self {
        Self { store, gate, audit }
    }

    pub async fn create(&self, caller: &Caller, new: NewProposal) -> Result<Proposal, AppError> {
        new.validate()?;

        if !self.gate.permits(&new) {
            warn!("Zeroth-gate rejected proposal '{}'", new.title.trim());
            return Err(AppError::Forbidden(
                "Proposal rejected by zeroth-gate check".to_string(),
            ));
        }

        // The resolved header identity wins over a self-declared proposer
        let claimed_proposer = new.proposer_id.clone();
        let proposer_id = caller.actor_id.clone().or(new.proposer_id);
        let proposal = Proposal::new(
            new.title.trim().to_string(),
            new.summary.trim().to_string(),
            new.details.filter(|d| !d.trim().is_empty()),
            proposer_id,
        );
        let proposal = self.store.create(proposal).await?;

        self.audit
            .append(
                AuditAction::ProposalCreated,
                caller.actor_id.as_deref(),
                &proposal.id,
                json!({
                    "title": proposal.title,
                    "status": proposal.status,
                    "proposerId": proposal.proposer_id,
                    "claimedProposerId": claimed_proposer,
                }),
            )
            .await;

        info!("Created proposal '{}' (id: {})", proposal.title, proposal.id);
        Ok(proposal)
    }
}
