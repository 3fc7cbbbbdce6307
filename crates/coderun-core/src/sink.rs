//! Destinations for finished execution records
//!
//! The orchestrator hands every record it builds to at most one sink. Sink
//! failures are logged and never change the record returned to the caller.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::core_types::ExecutionRecord;
use crate::errors::ExecutionError;

#[async_trait]
pub trait ExecutionSink: Send + Sync {
    async fn save(&self, record: &ExecutionRecord) -> Result<(), ExecutionError>;
}

/// Appends one JSON document per record to a file.
pub struct JsonLinesSink {
    path: PathBuf,
    // Serializes appends so concurrent records never interleave.
    lock: Mutex<()>,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ExecutionSink for JsonLinesSink {
    async fn save(&self, record: &ExecutionRecord) -> Result<(), ExecutionError> {
        let mut line = serde_json::to_string(record).map_err(|e| {
            ExecutionError::IoError(format!("Failed to serialize execution record: {}", e))
        })?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
