//! Audit sinks for storing audit entries

use super::{AuditEntry, AuditError, AuditRecord};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

/// Append-only destination for audit entries
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Seal the record onto the chain and store it
    async fn write(&self, record: AuditRecord) -> Result<AuditEntry, AuditError>;

    /// Read stored entries, oldest first, optionally for one proposal
    async fn read(&self, proposal_id: Option<&str>) -> Result<Vec<AuditEntry>, AuditError>;
}

/// In-memory audit sink, used when no log path is configured
pub struct MemoryAuditSink {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn write(&self, record: AuditRecord) -> Result<AuditEntry, AuditError> {
        let mut entries = self.entries.write().await;
        let previous = entries.last().map(|e| e.entry_hash.clone());
        let entry = record.seal(previous)?;
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn read(&self, proposal_id: Option<&str>) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| proposal_id.map_or(true, |id| e.proposal_id == id))
            .cloned()
            .collect())
    }
}

/// File-based audit sink writing one JSON object per line
pub struct FileAuditSink {
    path: PathBuf,
    /// Hash of the last line written; held while appending so file order
    /// and chain order agree
    last_hash: Mutex<Option<String>>,
}

impl FileAuditSink {
    /// Open (or create) the log, resuming the hash chain from its last line
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let path = path.into();
        let last_hash = if tokio::fs::try_exists(&path).await? {
            Self::terminate_partial_line(&path).await?;
            Self::read_lines(&path)
                .await?
                .last()
                .map(|e| e.entry_hash.clone())
        } else {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            None
        };

        Ok(Self {
            path,
            last_hash: Mutex::new(last_hash),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close off a line left unterminated by an interrupted write so the
    /// next append starts on a line of its own
    async fn terminate_partial_line(path: &Path) -> Result<(), AuditError> {
        let raw = tokio::fs::read(path).await?;
        if raw.last().is_some_and(|b| *b != b'\n') {
            warn!(path = %path.display(), "Audit log ends mid-line; terminating it");
            let mut file = OpenOptions::new().append(true).open(path).await?;
            file.write_all(b"\n").await?;
            file.flush().await?;
        }
        Ok(())
    }

    async fn read_lines(path: &Path) -> Result<Vec<AuditEntry>, AuditError> {
        let file = File::open(path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut entries = Vec::new();

        let mut line_no = 0usize;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            // A torn write leaves a partial line; skip it and let chain
            // verification report the gap
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(
                    path = %path.display(),
                    line = line_no,
                    error = %e,
                    "Skipping unreadable audit line"
                ),
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn write(&self, record: AuditRecord) -> Result<AuditEntry, AuditError> {
        let mut last_hash = self.last_hash.lock().await;
        let entry = record.seal(last_hash.clone())?;

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        *last_hash = Some(entry.entry_hash.clone());
        Ok(entry)
    }

    async fn read(&self, proposal_id: Option<&str>) -> Result<Vec<AuditEntry>, AuditError> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(Vec::new());
        }
        // Writers append whole lines under the same lock
        let _guard = self.last_hash.lock().await;
        let entries = Self::read_lines(&self.path).await?;
        Ok(entries
            .into_iter()
            .filter(|e| proposal_id.map_or(true, |id| e.proposal_id == id))
            .collect())
    }
}
