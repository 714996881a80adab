//! Trigger events.
//!
//! A run is started by an S3-style object-created notification. Only the
//! first entry is used; the object key is taken verbatim.

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::fmt;

use crate::error::{
    BucketMismatchSnafu, EmptyKeySnafu, EventError, MalformedEventSnafu, NoRecordsSnafu,
};

/// Storage event notification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Event {
    #[serde(rename = "Records", default)]
    pub records: Vec<S3EventRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3EventRecord {
    pub s3: S3Entity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Entity {
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Object {
    pub key: String,
}

impl S3Event {
    /// Build a single-object event, as a manual trigger.
    pub fn for_object(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            records: vec![S3EventRecord {
                s3: S3Entity {
                    bucket: S3Bucket {
                        name: bucket.into(),
                    },
                    object: S3Object { key: key.into() },
                },
            }],
        }
    }

    /// Interpret arbitrary JSON as a storage event.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, EventError> {
        serde_json::from_value(value.clone()).context(MalformedEventSnafu)
    }
}

/// The object a run reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceObject {
    pub bucket: String,
    pub key: String,
}

impl SourceObject {
    /// Extract the source object from `event`.
    ///
    /// The event must target `inbound_bucket`.
    pub fn from_event(event: &S3Event, inbound_bucket: &str) -> Result<Self, EventError> {
        let record = event.records.first().context(NoRecordsSnafu)?;
        let bucket = &record.s3.bucket.name;
        let key = &record.s3.object.key;

        ensure!(
            bucket == inbound_bucket,
            BucketMismatchSnafu {
                expected: inbound_bucket,
                actual: bucket.as_str(),
            }
        );
        ensure!(!key.is_empty(), EmptyKeySnafu);

        Ok(Self {
            bucket: bucket.clone(),
            key: key.clone(),
        })
    }

    /// Parse `value` as a storage event and extract the source object.
    pub fn from_value(value: &serde_json::Value, inbound_bucket: &str) -> Result<Self, EventError> {
        Self::from_event(&S3Event::from_value(value)?, inbound_bucket)
    }
}

impl fmt::Display for SourceObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extracts_first_record() {
        let event = json!({
            "Records": [
                {"s3": {"bucket": {"name": "inbound-file-drop"}, "object": {"key": "uploads/students.csv"}}},
                {"s3": {"bucket": {"name": "inbound-file-drop"}, "object": {"key": "other.csv"}}}
            ]
        });

        let object = SourceObject::from_value(&event, "inbound-file-drop").unwrap();
        assert_eq!(object.bucket, "inbound-file-drop");
        assert_eq!(object.key, "uploads/students.csv");
        assert_eq!(object.to_string(), "s3://inbound-file-drop/uploads/students.csv");
    }

    #[test]
    fn test_key_is_not_url_decoded() {
        let event = S3Event::for_object("inbound", "spring+intake%202024.csv");
        let object = SourceObject::from_event(&event, "inbound").unwrap();
        assert_eq!(object.key, "spring+intake%202024.csv");
    }

    #[test]
    fn test_rejects_foreign_bucket() {
        let event = S3Event::for_object("someone-else", "students.csv");
        let err = SourceObject::from_event(&event, "inbound").unwrap_err();
        assert!(matches!(
            err,
            EventError::BucketMismatch { ref actual, .. } if actual == "someone-else"
        ));
    }

    #[test]
    fn test_rejects_empty_event_and_key() {
        let err = SourceObject::from_value(&json!({"Records": []}), "inbound").unwrap_err();
        assert!(matches!(err, EventError::NoRecords));

        let err = SourceObject::from_value(&json!({}), "inbound").unwrap_err();
        assert!(matches!(err, EventError::NoRecords));

        let event = S3Event::for_object("inbound", "");
        let err = SourceObject::from_event(&event, "inbound").unwrap_err();
        assert!(matches!(err, EventError::EmptyKey));
    }

    #[test]
    fn test_rejects_malformed_event() {
        let err = SourceObject::from_value(&json!({"Records": [{"s3": {}}]}), "inbound")
            .unwrap_err();
        assert!(matches!(err, EventError::MalformedEvent { .. }));

        let err = SourceObject::from_value(&json!("not an event"), "inbound").unwrap_err();
        assert!(matches!(err, EventError::MalformedEvent { .. }));
    }
}
