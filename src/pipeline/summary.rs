//! Batch summary and its accumulator.

use serde::{Deserialize, Serialize};

use crate::error::RecordFailure;

/// Failure of one input row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// 1-based position of the record in the input.
    pub row: usize,
    pub message: String,
}

/// Outcome of one batch run.
///
/// `total_records_processed == total_inserted_records + total_failed_records`
/// and `records_failed_due_to_validation <= total_failed_records` always hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total_records_processed: usize,
    pub total_inserted_records: usize,
    pub total_failed_records: usize,
    pub records_failed_due_to_validation: usize,
    pub error_details: Vec<ErrorDetail>,
}

impl BatchSummary {
    /// Valid records the store refused.
    pub fn records_failed_due_to_persistence(&self) -> usize {
        self.total_failed_records
            .saturating_sub(self.records_failed_due_to_validation)
    }

    pub fn has_failures(&self) -> bool {
        self.total_failed_records > 0
    }
}

/// Running counts for a batch in progress.
#[derive(Debug, Default)]
pub(crate) struct BatchTally {
    processed: usize,
    failed: usize,
    invalid: usize,
    details: Vec<ErrorDetail>,
}

impl BatchTally {
    pub(crate) fn stored(&mut self) {
        self.processed += 1;
    }

    pub(crate) fn failed(&mut self, row: usize, failure: &RecordFailure) {
        self.processed += 1;
        self.failed += 1;
        if let RecordFailure::Validation { .. } = failure {
            self.invalid += 1;
        }
        self.details.push(ErrorDetail {
            row,
            message: failure.to_string(),
        });
    }

    pub(crate) fn finish(self) -> BatchSummary {
        BatchSummary {
            total_records_processed: self.processed,
            total_inserted_records: self.processed - self.failed,
            total_failed_records: self.failed,
            records_failed_due_to_validation: self.invalid,
            error_details: self.details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid(reason: &str) -> RecordFailure {
        RecordFailure::Validation {
            reasons: vec![reason.to_string()],
        }
    }

    fn rejected(cause: &str) -> RecordFailure {
        RecordFailure::Persistence {
            cause: cause.to_string(),
        }
    }

    #[test]
    fn test_serializes_with_camel_case_keys() {
        let mut tally = BatchTally::default();
        tally.stored();
        tally.failed(2, &invalid("course must NOT have fewer than 5 characters"));
        let summary = tally.finish();

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "totalRecordsProcessed": 2,
                "totalInsertedRecords": 1,
                "totalFailedRecords": 1,
                "recordsFailedDueToValidation": 1,
                "errorDetails": [
                    {"row": 2, "message": "course must NOT have fewer than 5 characters"}
                ]
            })
        );
    }

    #[test]
    fn test_empty_tally_is_all_zero() {
        let summary = BatchTally::default().finish();
        assert_eq!(summary, BatchSummary::default());
        assert!(!summary.has_failures());
    }

    #[test]
    fn test_persistence_failures_are_derived() {
        let mut tally = BatchTally::default();
        tally.failed(1, &invalid("a"));
        tally.failed(2, &rejected("b"));
        tally.failed(3, &rejected("c"));
        tally.stored();

        let summary = tally.finish();
        assert_eq!(summary.total_records_processed, 4);
        assert_eq!(summary.total_inserted_records, 1);
        assert_eq!(summary.total_failed_records, 3);
        assert_eq!(summary.records_failed_due_to_validation, 1);
        assert_eq!(summary.records_failed_due_to_persistence(), 2);
    }

    #[test]
    fn test_inconsistent_counters_do_not_underflow() {
        let summary = BatchSummary {
            total_records_processed: 1,
            total_inserted_records: 0,
            total_failed_records: 1,
            records_failed_due_to_validation: 3,
            error_details: Vec::new(),
        };
        assert_eq!(summary.records_failed_due_to_persistence(), 0);
    }
}
