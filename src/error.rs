//! Error types for flurry using snafu.
//!
//! Fatal errors abort a batch run and end up in the failure notification.
//! Per-record failures ([`RecordFailure`]) never leave the batch processor;
//! they become rows in the summary instead.

use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed: {source}"))]
    ObjectStore { source: object_store::Error },

    /// IO error during storage operations.
    #[snafu(display("IO error: {source}"))]
    Io { source: std::io::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error: {source}"))]
    S3Config { source: object_store::Error },
}

impl StorageError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Inbound bucket is empty.
    #[snafu(display("Inbound bucket cannot be empty"))]
    EmptyInboundBucket,

    /// Sink path is empty.
    #[snafu(display("Sink path cannot be empty"))]
    EmptySinkPath,

    /// Table name is empty.
    #[snafu(display("Table name cannot be empty"))]
    EmptyTable,

    /// The table key is not one of the schema fields.
    #[snafu(display("Key field '{field}' is not defined in the schema"))]
    UnknownKeyField { field: String },

    /// Delimiter must be a single byte.
    #[snafu(display("Delimiter must be a single ASCII character, got {delimiter:?}"))]
    InvalidDelimiter { delimiter: String },

    /// Schema could not be compiled.
    #[snafu(display("Invalid schema: {source}"))]
    Schema { source: SchemaError },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file: {source}"))]
    ReadFile { source: std::io::Error },
}

// ============ Schema Errors ============

/// Errors that can occur while compiling a record schema.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SchemaError {
    /// Schema has no fields.
    #[snafu(display("Schema must have at least one field"))]
    EmptySchema,

    /// A field is declared twice.
    #[snafu(display("Field '{field}' is declared more than once"))]
    DuplicateField { field: String },

    /// Length bounds cannot be satisfied.
    #[snafu(display("Field '{field}' has min_length {min} greater than max_length {max}"))]
    InvalidLengthBounds { field: String, min: usize, max: usize },
}

// ============ Event Errors ============

/// Errors extracting the source object from a trigger event.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum EventError {
    /// Event JSON does not match the storage notification shape.
    #[snafu(display("Malformed storage event: {source}"))]
    MalformedEvent { source: serde_json::Error },

    /// Event carries no records.
    #[snafu(display("Storage event contains no records"))]
    NoRecords,

    /// Event is for a bucket this pipeline does not own.
    #[snafu(display("Event bucket '{actual}' does not match inbound bucket '{expected}'"))]
    BucketMismatch { expected: String, actual: String },

    /// Event has an empty object key.
    #[snafu(display("Storage event has an empty object key"))]
    EmptyKey,
}

// ============ Decode Errors ============

/// Errors that can occur while decoding delimited input.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DecodeError {
    /// Header row could not be read.
    #[snafu(display("Failed to read header row: {source}"))]
    Header { source: csv::Error },

    /// A data row is not well-formed.
    #[snafu(display("Malformed row at line {line}: {source}"))]
    MalformedRow { line: u64, source: csv::Error },
}

// ============ Record Failures ============

/// A recoverable failure of a single record.
///
/// The display text is what lands in the row's error detail.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum RecordFailure {
    /// The record violates one or more schema constraints.
    #[snafu(display("{}", reasons.join(", ")))]
    Validation { reasons: Vec<String> },

    /// The store rejected the record.
    #[snafu(display("{cause}"))]
    Persistence { cause: String },
}

// ============ Store Errors ============

/// Errors that make the persistence gateway unusable for the rest of a batch.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// The store could not be reached.
    #[snafu(display("Table '{table}' is unreachable: {source}"))]
    Unreachable {
        table: String,
        source: object_store::Error,
    },

    /// The store could not be set up.
    #[snafu(display("Failed to open table storage: {source}"))]
    TableStorage { source: StorageError },
}

// ============ Notification Errors ============

/// Errors that can occur while publishing a notification.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum NotifyError {
    /// Failed to build the HTTP client.
    #[snafu(display("Failed to build notification client: {source}"))]
    ClientBuild { source: reqwest::Error },

    /// Request could not be sent.
    #[snafu(display("Failed to send notification: {source}"))]
    Request { source: reqwest::Error },

    /// Endpoint answered with a non-success status.
    #[snafu(display("Notification endpoint returned {status}: {body}"))]
    Status { status: u16, body: String },

    /// Notification could not be serialized.
    #[snafu(display("Failed to serialize notification: {source}"))]
    NotificationSerialize { source: serde_json::Error },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

// ============ DLQ Errors ============

/// Errors that can occur during rejected-records log operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
// Prefix is intentional to avoid snafu selector conflicts (e.g., WriteSnafu)
#[allow(clippy::enum_variant_names)]
pub enum DlqError {
    /// Failed to write to DLQ.
    #[snafu(display("Failed to write to DLQ: {source}"))]
    DlqWrite { source: StorageError },

    /// Failed to serialize rejected record.
    #[snafu(display("Failed to serialize DLQ record: {source}"))]
    DlqSerialize { source: serde_json::Error },

    /// Failed to create DLQ storage provider.
    #[snafu(display("Failed to create DLQ storage: {source}"))]
    DlqStorage { source: StorageError },
}

// ============ Pipeline Error (top-level) ============

/// Errors that abort a whole batch run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Trigger event could not be resolved to a source object.
    #[snafu(display("Unable to extract bucket and file name from storage event: {source}"))]
    Event { source: EventError },

    /// Source object could not be read.
    #[snafu(display("Unable to read s3://{bucket}/{key}: {source}"))]
    SourceRead {
        bucket: String,
        key: String,
        source: StorageError,
    },

    /// Source object is not well-formed delimited text.
    #[snafu(display("Unable to decode s3://{bucket}/{key}: {source}"))]
    Decode {
        bucket: String,
        key: String,
        source: DecodeError,
    },

    /// Persistence gateway became unusable.
    #[snafu(display("Unable to persist data set: {source}"))]
    Store { source: StoreError },

    /// Address parsing error.
    #[snafu(display("Failed to parse address: {source}"))]
    AddressParse { source: std::net::AddrParseError },

    /// Metrics error.
    #[snafu(display("Metrics error: {source}"))]
    Metrics { source: MetricsError },

    /// Notification channel could not be set up.
    #[snafu(display("Notifier error: {source}"))]
    Notifier { source: NotifyError },

    /// Event input could not be read.
    #[snafu(display("Failed to read event input: {source}"))]
    EventInput { source: std::io::Error },
}

impl PipelineError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            PipelineError::SourceRead { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_failure_joins_reasons() {
        let failure = RecordFailure::Validation {
            reasons: vec![
                "student_id must NOT have fewer than 5 characters".to_string(),
                "must have required property 'fname'".to_string(),
            ],
        };
        assert_eq!(
            failure.to_string(),
            "student_id must NOT have fewer than 5 characters, must have required property 'fname'"
        );
    }

    #[test]
    fn test_persistence_failure_is_cause_verbatim() {
        let failure = RecordFailure::Persistence {
            cause: "item size has exceeded the maximum allowed size".to_string(),
        };
        assert_eq!(
            failure.to_string(),
            "item size has exceeded the maximum allowed size"
        );
    }

    #[test]
    fn test_source_not_found_detection() {
        let err = PipelineError::SourceRead {
            bucket: "inbound".to_string(),
            key: "students.csv".to_string(),
            source: StorageError::ObjectStore {
                source: object_store::Error::NotFound {
                    path: "students.csv".to_string(),
                    source: "missing".into(),
                },
            },
        };
        assert!(err.is_not_found());
    }
}
