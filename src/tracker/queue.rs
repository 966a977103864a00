//! Persistent queue of events captured while the API was unreachable
//!
//! The whole queue is one JSON array on disk, rewritten after every
//! mutation (write to a sibling temp file, then rename). All mutations go
//! through the async mutex so a sync pass and a new capture never interleave
//! their writes.

use super::OutgoingEvent;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::warn;

/// One locally captured event awaiting (or past) delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRecord {
    pub id: String,
    pub session_id: String,
    pub event: OutgoingEvent,
    pub captured_at: DateTime<Utc>,
    pub synced: bool,
    /// Why the server refused this record; rejected records are never retried
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected: Option<String>,
}

impl PendingRecord {
    /// Still waiting for a delivery attempt to succeed
    pub fn is_pending(&self) -> bool {
        !self.synced && self.rejected.is_none()
    }
}

pub struct PendingQueue {
    path: Option<PathBuf>,
    records: Mutex<Vec<PendingRecord>>,
}

impl PendingQueue {
    /// Load the queue from `path`. A missing file is an empty queue; an
    /// unreadable one is logged and replaced on the next write.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "pending_queue_corrupt");
                Vec::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path: Some(path), records: Mutex::new(records) })
    }

    /// Queue that is never written to disk
    pub fn in_memory() -> Self {
        Self { path: None, records: Mutex::new(Vec::new()) }
    }

    async fn persist(&self, records: &[PendingRecord]) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(records)?).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    pub async fn push(&self, record: PendingRecord) -> Result<()> {
        let mut records = self.records.lock().await;
        records.push(record);
        self.persist(&records).await
    }

    /// Pending records in capture order
    pub async fn unsynced(&self) -> Vec<PendingRecord> {
        self.records.lock().await.iter().filter(|r| r.is_pending()).cloned().collect()
    }

    /// Flag delivered records and persist. Unknown ids are ignored.
    pub async fn mark_synced(&self, ids: &[String]) -> Result<()> {
        let mut records = self.records.lock().await;
        for record in records.iter_mut().filter(|r| ids.contains(&r.id)) {
            record.synced = true;
        }
        self.persist(&records).await
    }

    /// Dead-letter records the server refused, keyed by id with the reason
    pub async fn mark_rejected(&self, rejected: &[(String, String)]) -> Result<()> {
        let mut records = self.records.lock().await;
        for record in records.iter_mut() {
            if let Some((_, reason)) = rejected.iter().find(|(id, _)| *id == record.id) {
                record.rejected = Some(reason.clone());
            }
        }
        self.persist(&records).await
    }

    /// Drop delivered and rejected records. Returns how many were removed.
    pub async fn clear_synced(&self) -> Result<usize> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(PendingRecord::is_pending);
        let removed = before - records.len();
        if removed > 0 {
            self.persist(&records).await?;
        }
        Ok(removed)
    }

    pub async fn snapshot(&self) -> Vec<PendingRecord> {
        self.records.lock().await.clone()
    }

    pub async fn pending_count(&self) -> usize {
        self.records.lock().await.iter().filter(|r| r.is_pending()).count()
    }
}
