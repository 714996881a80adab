//! Rejected-records log.
//!
//! Every record that fails validation or persistence can also be written,
//! with its original fields, as NDJSON to a configurable storage location.
//! The log is best-effort: failures writing it are logged and never change
//! the batch outcome.

mod queue;
mod types;

pub use queue::DeadLetterQueue;
pub use types::{FailureStage, FailureStats, RejectedRecord};
