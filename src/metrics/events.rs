//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in a batch run.
//! Events implement the `InternalEvent` trait which emits the corresponding
//! Prometheus metric.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when source bytes are read.
pub struct BytesRead {
    pub bytes: u64,
}

impl InternalEvent for BytesRead {
    fn emit(self) {
        trace!(bytes = self.bytes, "Bytes read");
        counter!("flurry_bytes_read_total").increment(self.bytes);
    }
}

/// Event emitted when a file has been decoded into records.
pub struct RecordsDecoded {
    pub count: u64,
}

impl InternalEvent for RecordsDecoded {
    fn emit(self) {
        trace!(count = self.count, "Records decoded");
        counter!("flurry_records_decoded_total").increment(self.count);
    }
}

/// Outcome of a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Stored,
    Invalid,
    Rejected,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Stored => "stored",
            RecordStatus::Invalid => "invalid",
            RecordStatus::Rejected => "rejected",
        }
    }
}

/// Event emitted when a record has gone through validation and persistence.
pub struct RecordProcessed {
    pub status: RecordStatus,
}

impl InternalEvent for RecordProcessed {
    fn emit(self) {
        trace!(status = self.status.as_str(), "Record processed");
        counter!("flurry_records_processed_total", "status" => self.status.as_str()).increment(1);
    }
}

/// Outcome of a whole batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Completed,
    Aborted,
}

impl BatchStatus {
    fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Completed => "completed",
            BatchStatus::Aborted => "aborted",
        }
    }
}

/// Event emitted when a batch run finishes.
pub struct BatchCompleted {
    pub status: BatchStatus,
    pub duration: Duration,
}

impl InternalEvent for BatchCompleted {
    fn emit(self) {
        trace!(
            status = self.status.as_str(),
            duration_ms = self.duration.as_millis(),
            "Batch completed"
        );
        counter!("flurry_batches_total", "status" => self.status.as_str()).increment(1);
        histogram!("flurry_batch_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a store call returns.
pub struct StoreRequestDuration {
    pub duration: Duration,
}

impl InternalEvent for StoreRequestDuration {
    fn emit(self) {
        trace!(
            duration_ms = self.duration.as_millis(),
            "Store request completed"
        );
        histogram!("flurry_store_request_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a notification delivery is attempted.
pub struct NotificationSent {
    pub status: RequestStatus,
}

impl InternalEvent for NotificationSent {
    fn emit(self) {
        trace!(status = self.status.as_str(), "Notification sent");
        counter!("flurry_notifications_total", "status" => self.status.as_str()).increment(1);
    }
}

/// Event emitted when rejected records are flushed to the dead letter log.
pub struct RejectedRecordsWritten {
    pub count: u64,
}

impl InternalEvent for RejectedRecordsWritten {
    fn emit(self) {
        trace!(count = self.count, "Rejected records written");
        counter!("flurry_rejected_records_written_total").increment(self.count);
    }
}

// ============================================================================
// Storage operation events
// ============================================================================

/// Storage operation types.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    Get,
    Put,
}

impl StorageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::Get => "get",
            StorageOperation::Put => "put",
        }
    }
}

/// Status of an outbound request.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }

    pub fn from_ok(ok: bool) -> Self {
        if ok {
            RequestStatus::Success
        } else {
            RequestStatus::Error
        }
    }
}

/// Event emitted when a storage request completes.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            "Storage request"
        );
        counter!(
            "flurry_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted when a storage request completes with duration.
pub struct StorageRequestDuration {
    pub operation: StorageOperation,
    pub duration: Duration,
}

impl InternalEvent for StorageRequestDuration {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            duration_ms = self.duration.as_millis(),
            "Storage request duration"
        );
        histogram!(
            "flurry_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}
