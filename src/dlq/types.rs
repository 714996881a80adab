//! Rejected-records log types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RecordFailure;
use crate::record::Record;

/// Stage at which a record failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Validation,
    Persistence,
}

impl FailureStage {
    pub fn of(failure: &RecordFailure) -> Self {
        match failure {
            RecordFailure::Validation { .. } => FailureStage::Validation,
            RecordFailure::Persistence { .. } => FailureStage::Persistence,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Validation => "validation",
            FailureStage::Persistence => "persistence",
        }
    }
}

/// One failed record in the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedRecord {
    /// Run the record belonged to.
    pub batch_id: String,
    /// Object the record was decoded from.
    pub source: String,
    /// 1-based row in the source file.
    pub row: usize,
    pub stage: FailureStage,
    /// Same text as the row's error detail.
    pub error: String,
    pub record: Record,
    pub timestamp: DateTime<Utc>,
}

/// Failure counts by stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureStats {
    pub validation: usize,
    pub persistence: usize,
}

impl FailureStats {
    pub fn increment(&mut self, stage: FailureStage) {
        match stage {
            FailureStage::Validation => self.validation += 1,
            FailureStage::Persistence => self.persistence += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.validation + self.persistence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_stats_increment() {
        let mut stats = FailureStats::default();
        stats.increment(FailureStage::Validation);
        stats.increment(FailureStage::Validation);
        stats.increment(FailureStage::Persistence);

        assert_eq!(stats.validation, 2);
        assert_eq!(stats.persistence, 1);
        assert_eq!(stats.total(), 3);
    }

    #[test]
    fn test_rejected_record_serialization() {
        let rejected = RejectedRecord {
            batch_id: "b-1".to_string(),
            source: "s3://inbound/students.csv".to_string(),
            row: 2,
            stage: FailureStage::Validation,
            error: "course must NOT have fewer than 5 characters".to_string(),
            record: [("student_id", "bad"), ("course", "X")].into_iter().collect(),
            timestamp: Utc::now(),
        };

        let json: serde_json::Value = serde_json::to_value(&rejected).unwrap();
        assert_eq!(json["stage"], "validation");
        assert_eq!(json["row"], 2);
        assert_eq!(json["record"]["course"], "X");
    }
}
