//! Rejected-records log writer.
//!
//! Buffers failed records for one batch and writes them as a single NDJSON
//! object when the batch finishes.

use bytes::Bytes;
use chrono::Utc;
use object_store::PutPayload;
use object_store::path::Path;
use snafu::prelude::*;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::ErrorHandlingConfig;
use crate::emit;
use crate::error::{DlqError, DlqSerializeSnafu, DlqStorageSnafu, DlqWriteSnafu};
use crate::metrics::events::RejectedRecordsWritten;
use crate::record::Record;
use crate::storage::StorageProvider;

use super::types::{FailureStage, FailureStats, RejectedRecord};

/// Log of the records a batch could not load.
///
/// Each batch writes `rejected-<timestamp>-<batch_id>.ndjson`.
pub struct DeadLetterQueue {
    storage: Arc<StorageProvider>,
    batch_id: String,
    filename: String,
    buffer: Mutex<Vec<RejectedRecord>>,
    stats: Mutex<FailureStats>,
}

impl DeadLetterQueue {
    /// Create the log for one batch from configuration.
    ///
    /// Returns `None` if no log path is configured.
    pub async fn from_config(
        config: &ErrorHandlingConfig,
        batch_id: &str,
    ) -> Result<Option<Self>, DlqError> {
        let Some(dlq_path) = &config.dlq_path else {
            return Ok(None);
        };

        let storage =
            StorageProvider::for_url_with_options(dlq_path, config.dlq_storage_options.clone())
                .await
                .context(DlqStorageSnafu)?;

        let dlq = Self::with_storage(Arc::new(storage), batch_id);
        info!("Rejected-records log enabled: {}/{}", dlq_path, dlq.filename);
        Ok(Some(dlq))
    }

    /// Create the log on an existing storage provider.
    pub fn with_storage(storage: Arc<StorageProvider>, batch_id: &str) -> Self {
        let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
        Self {
            storage,
            batch_id: batch_id.to_string(),
            filename: format!("rejected-{timestamp}-{batch_id}.ndjson"),
            buffer: Mutex::new(Vec::new()),
            stats: Mutex::new(FailureStats::default()),
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Record a failed row.
    pub async fn record_failure(
        &self,
        source: &str,
        row: usize,
        stage: FailureStage,
        error: &str,
        record: &Record,
    ) {
        debug!(row, stage = stage.as_str(), "Recording rejected record");

        self.stats.lock().await.increment(stage);
        self.buffer.lock().await.push(RejectedRecord {
            batch_id: self.batch_id.clone(),
            source: source.to_string(),
            row,
            stage,
            error: error.to_string(),
            record: record.clone(),
            timestamp: Utc::now(),
        });
    }

    /// Current failure counts.
    pub async fn stats(&self) -> FailureStats {
        self.stats.lock().await.clone()
    }

    /// Write every buffered record and return the per-stage counts.
    ///
    /// Nothing is written when no record failed.
    pub async fn finalize(&self) -> Result<FailureStats, DlqError> {
        let records = std::mem::take(&mut *self.buffer.lock().await);
        let stats = self.stats().await;
        if records.is_empty() {
            return Ok(stats);
        }

        let mut ndjson = String::new();
        for record in &records {
            let line = serde_json::to_string(record).context(DlqSerializeSnafu)?;
            ndjson.push_str(&line);
            ndjson.push('\n');
        }

        let path = Path::from(self.filename.as_str());
        self.storage
            .put_payload(&path, PutPayload::from(Bytes::from(ndjson)))
            .await
            .context(DlqWriteSnafu)?;
        emit!(RejectedRecordsWritten {
            count: records.len() as u64,
        });

        info!(
            "Rejected-records log written: {} records (validation={}, persistence={}) to {}",
            stats.total(),
            stats.validation,
            stats.persistence,
            self.filename
        );
        Ok(stats)
    }
}
