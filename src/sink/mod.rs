//! Persistence gateway.
//!
//! Stores one record at a time. A rejected record is an ordinary outcome;
//! only a store that cannot be reached is an error.

pub mod table;

pub use table::ObjectStoreTable;

use async_trait::async_trait;

use crate::error::{RecordFailure, StoreError};
use crate::record::Record;

/// Result of storing a single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceOutcome {
    Stored,
    /// The store refused the record; `reason` is its cause verbatim.
    Rejected { reason: String },
}

impl PersistenceOutcome {
    /// The per-record failure, if the store refused the record.
    pub fn into_failure(self) -> Option<RecordFailure> {
        match self {
            PersistenceOutcome::Stored => None,
            PersistenceOutcome::Rejected { reason } => {
                Some(RecordFailure::Persistence { cause: reason })
            }
        }
    }
}

/// A durable key-value store for records.
///
/// Calls are independent and never retried. `Err` means the store is
/// unusable for the rest of the batch.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn store(&self, record: &Record) -> Result<PersistenceOutcome, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_becomes_persistence_failure() {
        assert!(PersistenceOutcome::Stored.into_failure().is_none());

        let failure = PersistenceOutcome::Rejected {
            reason: "Item size has exceeded the maximum allowed size".to_string(),
        }
        .into_failure()
        .unwrap();
        assert_eq!(
            failure,
            RecordFailure::Persistence {
                cause: "Item size has exceeded the maximum allowed size".to_string()
            }
        );
        assert_eq!(
            failure.to_string(),
            "Item size has exceeded the maximum allowed size"
        );
    }
}
