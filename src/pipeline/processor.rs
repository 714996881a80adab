//! Validate-then-store loop over a decoded batch.

use std::sync::Arc;
use tracing::{debug, warn};

use super::summary::{BatchSummary, BatchTally};
use crate::dlq::{DeadLetterQueue, FailureStage};
use crate::emit;
use crate::error::StoreError;
use crate::metrics::events::{RecordProcessed, RecordStatus};
use crate::record::Record;
use crate::schema::RecordSchema;
use crate::sink::RecordStore;

/// Where failed rows are copied, besides the summary.
#[derive(Clone, Copy)]
pub struct RejectedLog<'a> {
    pub queue: &'a DeadLetterQueue,
    /// Object the batch was decoded from.
    pub source: &'a str,
}

impl RejectedLog<'_> {
    async fn record(&self, row: usize, stage: FailureStage, error: &str, record: &Record) {
        self.queue
            .record_failure(self.source, row, stage, error, record)
            .await;
    }
}

/// Runs every record of a batch through validation and persistence.
///
/// Records are handled strictly one after another in input order; a record's
/// store call completes before the next record is validated.
#[derive(Clone)]
pub struct BatchProcessor {
    schema: Arc<RecordSchema>,
    store: Arc<dyn RecordStore>,
}

impl BatchProcessor {
    pub fn new(schema: Arc<RecordSchema>, store: Arc<dyn RecordStore>) -> Self {
        Self { schema, store }
    }

    /// Process a batch and summarize it.
    ///
    /// Per-record failures end up in the summary. An unreachable store
    /// aborts the batch and no summary is produced.
    pub async fn process<I>(&self, records: I) -> Result<BatchSummary, StoreError>
    where
        I: IntoIterator<Item = Record>,
    {
        self.process_logged(records, None).await
    }

    /// Like [`process`](Self::process), also copying failed rows to `log`.
    pub async fn process_logged<I>(
        &self,
        records: I,
        log: Option<RejectedLog<'_>>,
    ) -> Result<BatchSummary, StoreError>
    where
        I: IntoIterator<Item = Record>,
    {
        let mut tally = BatchTally::default();

        for (idx, record) in records.into_iter().enumerate() {
            let row = idx + 1;

            let failure = match self.schema.validate(&record).into_failure() {
                Some(failure) => failure,
                None => match self.store.store(&record).await?.into_failure() {
                    Some(failure) => failure,
                    None => {
                        debug!(row, "Record stored");
                        emit!(RecordProcessed {
                            status: RecordStatus::Stored,
                        });
                        tally.stored();
                        continue;
                    }
                },
            };

            let message = failure.to_string();
            let stage = FailureStage::of(&failure);
            match stage {
                FailureStage::Validation => {
                    warn!(row, "Unable to insert item due to validation failure: {}", message);
                    emit!(RecordProcessed {
                        status: RecordStatus::Invalid,
                    });
                }
                FailureStage::Persistence => {
                    warn!(row, "Unable to insert item: {}", message);
                    emit!(RecordProcessed {
                        status: RecordStatus::Rejected,
                    });
                }
            }
            if let Some(log) = &log {
                log.record(row, stage, &message, &record).await;
            }
            tally.failed(row, &failure);
        }

        Ok(tally.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldConfig, SchemaConfig};
    use crate::sink::PersistenceOutcome;
    use crate::storage::StorageProvider;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Store double driven by the record's key.
    #[derive(Default)]
    struct ScriptedStore {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RecordStore for ScriptedStore {
        async fn store(&self, record: &Record) -> Result<PersistenceOutcome, StoreError> {
            let key = record.get("student_id").unwrap_or_default().to_string();
            self.calls.lock().unwrap().push(key.clone());
            match key.as_str() {
                k if k.starts_with("REJECT") => Ok(PersistenceOutcome::Rejected {
                    reason: "ConditionalCheckFailed".to_string(),
                }),
                k if k.starts_with("DOWN") => Err(StoreError::Unreachable {
                    table: "T".to_string(),
                    source: object_store::Error::Generic {
                        store: "test",
                        source: "connection refused".into(),
                    },
                }),
                _ => Ok(PersistenceOutcome::Stored),
            }
        }
    }

    fn schema() -> Arc<RecordSchema> {
        let field = |name: &str, min: usize, max: Option<usize>| FieldConfig {
            name: name.to_string(),
            required: true,
            min_length: Some(min),
            max_length: max,
            ..FieldConfig::default()
        };
        Arc::new(
            RecordSchema::compile(&SchemaConfig {
                fields: vec![
                    field("student_id", 5, Some(20)),
                    field("fname", 1, None),
                    field("course", 5, None),
                ],
            })
            .unwrap(),
        )
    }

    fn student(id: &str, fname: &str, course: &str) -> Record {
        [("student_id", id), ("fname", fname), ("course", course)]
            .into_iter()
            .collect()
    }

    fn processor() -> (Arc<ScriptedStore>, BatchProcessor) {
        let store = Arc::new(ScriptedStore::default());
        (store.clone(), BatchProcessor::new(schema(), store))
    }

    #[tokio::test]
    async fn test_empty_batch_gives_zero_summary() {
        let (store, processor) = processor();
        let summary = processor.process(Vec::new()).await.unwrap();
        assert_eq!(summary, BatchSummary::default());
        assert!(store.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mixed_batch() {
        let (store, processor) = processor();
        let summary = processor
            .process(vec![
                student("S12345", "Ann", "MATHS1"),
                student("bad", "", "X"),
            ])
            .await
            .unwrap();

        assert_eq!(summary.total_records_processed, 2);
        assert_eq!(summary.total_inserted_records, 1);
        assert_eq!(summary.total_failed_records, 1);
        assert_eq!(summary.records_failed_due_to_validation, 1);
        assert_eq!(summary.error_details.len(), 1);
        assert_eq!(summary.error_details[0].row, 2);
        let message = &summary.error_details[0].message;
        assert!(message.contains("student_id must NOT have fewer than 5 characters"));
        assert!(message.contains("fname must NOT have fewer than 1 characters"));
        assert!(message.contains("course must NOT have fewer than 5 characters"));

        // the invalid record never reaches the store
        assert_eq!(*store.calls.lock().unwrap(), vec!["S12345"]);
    }

    #[tokio::test]
    async fn test_rejected_record_counts_as_failed_not_invalid() {
        let (_, processor) = processor();
        let summary = processor
            .process(vec![
                student("S12345", "Ann", "MATHS1"),
                student("REJECT1", "Bob", "PHYS01"),
            ])
            .await
            .unwrap();

        assert_eq!(summary.total_failed_records, 1);
        assert_eq!(summary.records_failed_due_to_validation, 0);
        assert_eq!(summary.records_failed_due_to_persistence(), 1);
        assert_eq!(summary.error_details[0].row, 2);
        assert_eq!(summary.error_details[0].message, "ConditionalCheckFailed");
    }

    #[tokio::test]
    async fn test_unreachable_store_aborts_batch() {
        let (store, processor) = processor();
        let result = processor
            .process(vec![
                student("S12345", "Ann", "MATHS1"),
                student("DOWN1", "Bob", "PHYS01"),
                student("S99999", "Cy", "CHEM01"),
            ])
            .await;

        assert!(matches!(result, Err(StoreError::Unreachable { .. })));
        assert_eq!(*store.calls.lock().unwrap(), vec!["S12345", "DOWN1"]);
    }

    #[tokio::test]
    async fn test_counts_always_balance() {
        let (_, processor) = processor();
        let records = vec![
            student("S00001", "Ann", "MATHS1"),
            student("x", "Bob", "PHYS01"),
            student("REJECT2", "Cy", "CHEM01"),
            student("S00004", "", "BIOL01"),
            student("S00005", "Di", "HIST01"),
        ];
        let summary = processor.process(records).await.unwrap();

        assert_eq!(
            summary.total_records_processed,
            summary.total_inserted_records + summary.total_failed_records
        );
        assert!(summary.records_failed_due_to_validation <= summary.total_failed_records);
        let rows: Vec<_> = summary.error_details.iter().map(|d| d.row).collect();
        assert_eq!(rows, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_failed_rows_are_copied_to_log() {
        let memory = Arc::new(object_store::memory::InMemory::new());
        let storage = Arc::new(StorageProvider::with_store("memory", memory));
        let queue = DeadLetterQueue::with_storage(storage, "batch-1");

        let (_, processor) = processor();
        let log = RejectedLog {
            queue: &queue,
            source: "s3://inbound/students.csv",
        };
        processor
            .process_logged(
                vec![
                    student("bad", "Ann", "MATHS1"),
                    student("REJECT3", "Bob", "PHYS01"),
                    student("S12345", "Cy", "CHEM01"),
                ],
                Some(log),
            )
            .await
            .unwrap();

        let stats = queue.stats().await;
        assert_eq!(stats.validation, 1);
        assert_eq!(stats.persistence, 1);
    }
}
