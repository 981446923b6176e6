//! Application state management
//!
//! Contains shared state accessible across all handlers. Built once at
//! startup; nothing here is a process-wide global.

use crate::audit::{verify_chain, AuditError, AuditLogger, AuditSink, FileAuditSink, MemoryAuditSink};
use crate::auth::{HeaderIdentityResolver, IdentityResolver};
use crate::config::ConsensusConfig;
use crate::consensus::{ConsensusCalculator, TallyReporter, VoteIngestion};
use crate::proposal::{InMemoryProposalStore, ProposalIntake, ProposalRepository, StaticGate, ZerothGate};
use std::sync::Arc;
use tracing::{info, warn};

/// Application state shared across all handlers
pub struct AppState {
    /// Creates proposals behind the zeroth-gate
    pub intake: ProposalIntake,

    /// The only write path for votes (has internal per-proposal locking)
    pub ingestion: VoteIngestion,

    /// Read-only tally views
    pub reporter: TallyReporter,

    /// Audit trail, also readable through the API
    pub audit: AuditLogger,

    /// Resolves caller identity from request headers
    pub identity: Arc<dyn IdentityResolver>,
}

impl AppState {
    /// Wire the components around one proposal store and one audit sink
    pub fn new(
        store: Arc<dyn ProposalRepository>,
        audit_sink: Arc<dyn AuditSink>,
        gate: Arc<dyn ZerothGate>,
        config: &ConsensusConfig,
    ) -> Self {
        let calculator = ConsensusCalculator::new(config.approval_threshold);
        let audit = AuditLogger::new(audit_sink);

        Self {
            intake: ProposalIntake::new(store.clone(), gate, audit.clone()),
            ingestion: VoteIngestion::new(store.clone(), calculator, audit.clone()),
            reporter: TallyReporter::new(store, calculator),
            audit,
            identity: Arc::new(HeaderIdentityResolver),
        }
    }

    /// Build state from configuration, opening the audit log if one is configured
    pub async fn from_config(config: &ConsensusConfig) -> Result<Self, AuditError> {
        let audit_sink: Arc<dyn AuditSink> = match &config.audit_log_path {
            Some(path) => {
                let sink = FileAuditSink::open(path).await?;
                let existing = sink.read(None).await?;
                if !verify_chain(&existing) {
                    warn!("Audit trail at {} fails hash-chain verification", sink.path().display());
                }
                info!("Audit trail: {} ({} entries)", sink.path().display(), existing.len());
                Arc::new(sink)
            }
            None => {
                info!("Audit trail: in-memory (AUDIT_LOG_PATH is empty)");
                Arc::new(MemoryAuditSink::new())
            }
        };

        Ok(Self::new(
            Arc::new(InMemoryProposalStore::new()),
            audit_sink,
            Arc::new(StaticGate::new(config.zeroth_gate_open)),
            config,
        ))
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_config_with_file_audit() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConsensusConfig {
            audit_log_path: Some(dir.path().join("audit.jsonl")),
            ..ConsensusConfig::default()
        };
        let state = AppState::from_config(&config).await.unwrap();
        assert!(state.audit.entries(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_from_config_starts_over_torn_audit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        tokio::fs::write(&path, r#"{"id":"trunc"#).await.unwrap();

        let config = ConsensusConfig {
            audit_log_path: Some(path),
            ..ConsensusConfig::default()
        };
        let state = AppState::from_config(&config).await.unwrap();
        assert!(state.audit.entries(None).await.unwrap().is_empty());
    }
}
