//! Opportunity persistence
//!
//! Append-only JSON-lines log keyed by the emitter's monotonic id.
//! Durability is best-effort: writes are buffered by the OS and loss on
//! crash is acceptable.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::core::Opportunity;

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One persisted detection
#[derive(Debug, Clone, Serialize)]
pub struct OpportunityRecord {
    pub id: u64,
    pub t_detected: DateTime<Utc>,
    pub kind: &'static str,
    pub payload: Opportunity,
}

impl OpportunityRecord {
    pub fn new(id: u64, opportunity: Opportunity) -> Self {
        Self {
            id,
            t_detected: opportunity.t_detected(),
            kind: opportunity.kind(),
            payload: opportunity,
        }
    }
}

/// Append-only sink for detections
#[async_trait]
pub trait OpportunityStore: Send {
    async fn append(&mut self, record: &OpportunityRecord) -> Result<(), PersistError>;
}

/// JSON-lines file store, one record per line
pub struct JsonlStore {
    file: File,
}

impl JsonlStore {
    pub async fn open(path: &Path) -> Result<Self, PersistError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        tracing::info!("opportunity log: {}", path.display());
        Ok(Self { file })
    }
}

#[async_trait]
impl OpportunityStore for JsonlStore {
    async fn append(&mut self, record: &OpportunityRecord) -> Result<(), PersistError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file.write_all(&line).await?;
        self.file.flush().await?;
        Ok(())
    }
}
