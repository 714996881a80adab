//! Batch run orchestration.
//!
//! One run handles one trigger event:
//! extract the source object, read it, decode it, validate and store each
//! record, then publish exactly one notification. Every log line of a run is
//! emitted inside a `batch` span carrying its `batch_id`.

mod processor;
mod summary;

pub use processor::{BatchProcessor, RejectedLog};
pub use summary::{BatchSummary, ErrorDetail};

use snafu::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::{Config, ErrorHandlingConfig};
use crate::dlq::DeadLetterQueue;
use crate::emit;
use crate::error::{
    ConfigSnafu, DecodeSnafu, EventError, EventSnafu, NotifierSnafu, PipelineError,
    SchemaSnafu, SourceReadSnafu, StoreSnafu,
};
use crate::event::{S3Event, SourceObject};
use crate::metrics::events::{BatchCompleted, BatchStatus};
use crate::notify::{self, Notification, Notifier};
use crate::schema::RecordSchema;
use crate::sink::{ObjectStoreTable, RecordStore};
use crate::source::{CsvDecoder, CsvDecoderConfig};
use crate::storage::{BucketSource, ObjectSource};

/// Result of one batch run.
#[derive(Debug)]
pub struct BatchOutcome {
    pub batch_id: String,
    /// The summary, or the error that aborted the run.
    pub result: Result<BatchSummary, PipelineError>,
    /// Whether the notification was delivered.
    pub notified: bool,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Report a run that failed before it could handle its event.
///
/// Publishes the run's one failure notification under a fresh batch id.
pub async fn abort(
    notifier: &dyn Notifier,
    topic: Option<String>,
    error: PipelineError,
) -> BatchOutcome {
    let batch_id = Uuid::new_v4().to_string();
    let span = info_span!("batch", batch_id = %batch_id);

    async {
        let report = snafu::Report::from_error(&error).to_string();
        error!("Unable to start batch: {}", report);
        emit!(BatchCompleted {
            status: BatchStatus::Aborted,
            duration: Duration::ZERO,
        });

        let notification = Notification::failure(&batch_id, topic, report);
        let notified = notify::deliver(notifier, &notification).await;

        BatchOutcome {
            batch_id: batch_id.clone(),
            result: Err(error),
            notified,
        }
    }
    .instrument(span)
    .await
}

/// Handles trigger events end to end.
pub struct BatchRunner {
    inbound_bucket: String,
    topic: Option<String>,
    decoder: CsvDecoder,
    source: Arc<dyn ObjectSource>,
    processor: BatchProcessor,
    notifier: Arc<dyn Notifier>,
    error_handling: ErrorHandlingConfig,
}

impl BatchRunner {
    /// Assemble a runner from explicit collaborators.
    pub fn new(
        config: &Config,
        source: Arc<dyn ObjectSource>,
        store: Arc<dyn RecordStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, PipelineError> {
        let schema = RecordSchema::compile(&config.schema)
            .context(SchemaSnafu)
            .context(ConfigSnafu)?;
        let decoder = CsvDecoder::new(CsvDecoderConfig::from_config(config).context(ConfigSnafu)?);

        Ok(Self {
            inbound_bucket: config.source.bucket.clone(),
            topic: config.notification.topic.clone(),
            decoder,
            source,
            processor: BatchProcessor::new(Arc::new(schema), store),
            notifier,
            error_handling: config.error_handling.clone(),
        })
    }

    /// Assemble a runner backed by the configured storage and notifier.
    pub async fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let notifier = notify::from_config(&config.notification).context(NotifierSnafu)?;
        Self::with_notifier(config, notifier).await
    }

    /// Assemble a runner backed by the configured storage, publishing to
    /// `notifier`.
    ///
    /// The notifier is built by the caller so that a failure here can still
    /// be reported through [`abort`].
    pub async fn with_notifier(
        config: &Config,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, PipelineError> {
        let source = Arc::new(BucketSource::new(
            config.source.clone(),
            config.region.clone(),
        ));
        let store = Arc::new(ObjectStoreTable::from_config(config).await.context(StoreSnafu)?);

        info!(
            "Runner ready: inbound bucket {}, table {}",
            config.source.bucket, config.sink.table
        );
        Self::new(config, source, store, notifier)
    }

    /// Handle a raw trigger event.
    pub async fn handle(&self, event: &serde_json::Value) -> BatchOutcome {
        let batch_id = Uuid::new_v4().to_string();
        let span = info_span!("batch", batch_id = %batch_id);

        async {
            info!("Incoming event: {}", event);
            let object = SourceObject::from_value(event, &self.inbound_bucket);
            self.execute(batch_id.clone(), object).await
        }
        .instrument(span)
        .await
    }

    /// Handle an already-parsed trigger event.
    pub async fn handle_event(&self, event: &S3Event) -> BatchOutcome {
        let batch_id = Uuid::new_v4().to_string();
        let span = info_span!("batch", batch_id = %batch_id);

        async {
            info!("Incoming event: {:?}", event);
            let object = SourceObject::from_event(event, &self.inbound_bucket);
            self.execute(batch_id.clone(), object).await
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        batch_id: String,
        object: Result<SourceObject, EventError>,
    ) -> BatchOutcome {
        let start = Instant::now();
        let result = match object.context(EventSnafu) {
            Ok(object) => self.run(&batch_id, &object).await,
            Err(e) => Err(e),
        };

        let notification = match &result {
            Ok(summary) => {
                info!(
                    processed = summary.total_records_processed,
                    inserted = summary.total_inserted_records,
                    failed = summary.total_failed_records,
                    invalid = summary.records_failed_due_to_validation,
                    rejected = summary.records_failed_due_to_persistence(),
                    "Batch run completed"
                );
                emit!(BatchCompleted {
                    status: BatchStatus::Completed,
                    duration: start.elapsed(),
                });
                Notification::summary(&batch_id, self.topic.clone(), summary.clone())
            }
            Err(e) => {
                let report = snafu::Report::from_error(e).to_string();
                error!("Error encountered while processing batch: {}", report);
                emit!(BatchCompleted {
                    status: BatchStatus::Aborted,
                    duration: start.elapsed(),
                });
                Notification::failure(&batch_id, self.topic.clone(), report)
            }
        };

        let notified = notify::deliver(self.notifier.as_ref(), &notification).await;

        BatchOutcome {
            batch_id,
            result,
            notified,
        }
    }

    async fn run(
        &self,
        batch_id: &str,
        object: &SourceObject,
    ) -> Result<BatchSummary, PipelineError> {
        info!("Extracted bucket and file name: {}", object);

        let bytes = self.source.open(object).await.context(SourceReadSnafu {
            bucket: &object.bucket,
            key: &object.key,
        })?;

        let location = object.to_string();
        let records = self
            .decoder
            .decode_all(bytes, &location)
            .context(DecodeSnafu {
                bucket: &object.bucket,
                key: &object.key,
            })?;
        info!("Number of records fetched from file: {}", records.len());

        let dlq = match DeadLetterQueue::from_config(&self.error_handling, batch_id).await {
            Ok(dlq) => dlq,
            Err(e) => {
                warn!("Rejected-records log unavailable: {}", e);
                None
            }
        };
        let log = dlq.as_ref().map(|queue| RejectedLog {
            queue,
            source: &location,
        });

        let result = self.processor.process_logged(records, log).await;

        if let Some(dlq) = &dlq
            && let Err(e) = dlq.finalize().await
        {
            warn!("Failed to write rejected-records log: {}", e);
        }

        result.context(StoreSnafu)
    }
}
