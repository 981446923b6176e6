//! Audit trail
//!
//! Every mutating action is recorded as an append-only entry. Entries are
//! hash-chained: each carries the SHA-256 of its own content plus the hash
//! of the entry before it, so a rewritten line breaks the chain.
//!
//! Recording is best-effort. A failing sink is logged and otherwise
//! ignored; it never fails the operation that triggered it.

mod sink;

pub use sink::{AuditSink, FileAuditSink, MemoryAuditSink};

use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Audit I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Audit sink unavailable: {0}")]
    #[allow(dead_code)]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    ProposalCreated,
    VoteCast,
    /// Proposal left `pending`
    ProposalFinalized,
}

/// An audit record before it is sealed onto the chain
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub actor_id: Option<String>,
    pub proposal_id: String,
    pub payload: serde_json::Value,
}

impl AuditRecord {
    pub fn new(
        action: AuditAction,
        actor_id: Option<String>,
        proposal_id: String,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action,
            actor_id,
            proposal_id,
            payload,
        }
    }

    /// Attach chain hashes
    pub fn seal(self, previous_hash: Option<String>) -> Result<AuditEntry, AuditError> {
        let mut entry = AuditEntry {
            id: self.id,
            timestamp: self.timestamp,
            action: self.action,
            actor_id: self.actor_id,
            proposal_id: self.proposal_id,
            payload: self.payload,
            previous_hash,
            entry_hash: String::new(),
        };
        entry.entry_hash = entry.compute_hash()?;
        Ok(entry)
    }
}

/// A stored, sealed audit entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub actor_id: Option<String>,
    pub proposal_id: String,
    pub payload: serde_json::Value,
    pub previous_hash: Option<String>,
    pub entry_hash: String,
}

impl AuditEntry {
    fn compute_hash(&self) -> Result<String, AuditError> {
        let content = serde_json::to_vec(&serde_json::json!({
            "id": self.id,
            "timestamp": self.timestamp,
            "action": self.action,
            "actorId": self.actor_id,
            "proposalId": self.proposal_id,
            "payload": self.payload,
        }))?;

        let mut hasher = Sha256::new();
        if let Some(prev) = &self.previous_hash {
            hasher.update(prev.as_bytes());
        }
        hasher.update(&content);
        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// Check that every entry's hash matches its content and links to the one before
pub fn verify_chain(entries: &[AuditEntry]) -> bool {
    let mut previous: Option<&str> = None;
    for entry in entries {
        if entry.previous_hash.as_deref() != previous {
            return false;
        }
        match entry.compute_hash() {
            Ok(hash) if hash == entry.entry_hash => {}
            _ => return false,
        }
        previous = Some(entry.entry_hash.as_str());
    }
    true
}

/// Best-effort front end over an audit sink
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Logger backed by a fresh in-memory sink
    #[allow(dead_code)]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryAuditSink::new()))
    }

    /// Record an action. Never fails; sink errors are logged and dropped.
    pub async fn append(
        &self,
        action: AuditAction,
        actor_id: Option<&str>,
        proposal_id: &str,
        payload: serde_json::Value,
    ) {
        let record = AuditRecord::new(
            action,
            actor_id.map(str::to_string),
            proposal_id.to_string(),
            payload,
        );

        match self.sink.write(record).await {
            Ok(entry) => debug!(
                action = ?entry.action,
                proposal_id = %entry.proposal_id,
                hash = %entry.entry_hash,
                "Audit entry recorded"
            ),
            Err(e) => warn!(
                action = ?action,
                proposal_id = %proposal_id,
                error = %e,
                "Failed to record audit entry"
            ),
        }
    }

    /// Entries for one proposal (or all), oldest first
    pub async fn entries(&self, proposal_id: Option<&str>) -> Result<Vec<AuditEntry>, AppError> {
        self.sink
            .read(proposal_id)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read audit log: {}", e)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    /// Sink that rejects every write
    pub(crate) struct BrokenSink;

    #[async_trait]
    impl AuditSink for BrokenSink {
        async fn write(&self, _record: AuditRecord) -> Result<AuditEntry, AuditError> {
            Err(AuditError::Unavailable("disk full".into()))
        }

        async fn read(&self, _proposal_id: Option<&str>) -> Result<Vec<AuditEntry>, AuditError> {
            Err(AuditError::Unavailable("disk full".into()))
        }
    }

    #[tokio::test]
    async fn test_append_swallows_sink_failure() {
        let logger = AuditLogger::new(Arc::new(BrokenSink));
        // Must return normally
        logger
            .append(AuditAction::VoteCast, Some("h1"), "p1", json!({}))
            .await;
        assert!(matches!(logger.entries(None).await, Err(AppError::Internal(_))));
    }

    #[tokio::test]
    async fn test_append_and_filter() {
        let logger = AuditLogger::in_memory();
        logger.append(AuditAction::ProposalCreated, None, "p1", json!({"title": "a"})).await;
        logger.append(AuditAction::VoteCast, Some("s1"), "p1", json!({"decision": "veto"})).await;
        logger.append(AuditAction::ProposalCreated, None, "p2", json!({"title": "b"})).await;

        let p1 = logger.entries(Some("p1")).await.unwrap();
        assert_eq!(p1.len(), 2);
        assert_eq!(p1[1].actor_id.as_deref(), Some("s1"));
        assert!(verify_chain(&logger.entries(None).await.unwrap()));
    }

    #[test]
    fn test_tampered_entry_breaks_chain() {
        let first = AuditRecord::new(AuditAction::VoteCast, None, "p1".into(), json!({"decision": "approve"}))
            .seal(None)
            .unwrap();
        let second = AuditRecord::new(AuditAction::VoteCast, None, "p1".into(), json!({"decision": "approve"}))
            .seal(Some(first.entry_hash.clone()))
            .unwrap();

        let mut entries = vec![first, second];
        assert!(verify_chain(&entries));

        entries[0].payload = json!({"decision": "veto"});
        assert!(!verify_chain(&entries));
    }
}
