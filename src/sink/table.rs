//! Key-value table on top of object storage.
//!
//! Each item lives at `<table>/<key>.json` and holds the record's retained
//! fields as a flat JSON object. Writes overwrite.

use async_trait::async_trait;
use bytes::Bytes;
use object_store::path::Path;
use object_store::{PutOptions, PutPayload};
use snafu::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::{PersistenceOutcome, RecordStore};
use crate::config::{Config, SinkConfig};
use crate::emit;
use crate::error::{StoreError, TableStorageSnafu, UnreachableSnafu};
use crate::metrics::events::StoreRequestDuration;
use crate::record::Record;
use crate::storage::{StorageProvider, StorageProviderRef};

/// Records stored as JSON objects, keyed by one field.
#[derive(Debug, Clone)]
pub struct ObjectStoreTable {
    storage: StorageProviderRef,
    table: String,
    key_field: String,
    max_item_bytes: usize,
}

impl ObjectStoreTable {
    pub fn new(storage: StorageProviderRef, sink: &SinkConfig) -> Self {
        Self {
            storage,
            table: sink.table.clone(),
            key_field: sink.key_field.clone(),
            max_item_bytes: sink.max_item_bytes,
        }
    }

    /// Open the table described by the configuration.
    pub async fn from_config(config: &Config) -> Result<Self, StoreError> {
        let mut options = config.sink.storage_options.clone();
        if let Some(region) = &config.region
            && !options.keys().any(|k| k.ends_with("region"))
        {
            options.insert("aws_region".to_string(), region.clone());
        }

        let storage = StorageProvider::for_url_with_options(&config.sink.path, options)
            .await
            .context(TableStorageSnafu)?;
        debug!("Opened table {} at {:?}", config.sink.table, storage);

        Ok(Self::new(Arc::new(storage), &config.sink))
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Location of the item with `key`, or the reason the key is unusable.
    pub fn item_path(&self, key: &str) -> Result<Path, String> {
        let valid_segment = Path::parse(key).is_ok_and(|p| p.parts().count() == 1);
        if !valid_segment {
            return Err(format!(
                "One or more parameter values were invalid: key {} has an invalid value '{}'",
                self.key_field, key
            ));
        }
        Ok(Path::from(self.table.as_str()).child(format!("{key}.json")))
    }

    fn key_of<'a>(&self, record: &'a Record) -> Result<&'a str, String> {
        match record.get(&self.key_field) {
            None => Err(format!(
                "One or more parameter values were invalid: Missing the key {} in the item",
                self.key_field
            )),
            Some("") => Err(format!(
                "One or more parameter values are not valid. The AttributeValue for a key \
                 attribute cannot contain an empty string value. Key: {}",
                self.key_field
            )),
            Some(key) => Ok(key),
        }
    }

    async fn put(&self, record: &Record) -> Result<PersistenceOutcome, StoreError> {
        let path = match self.key_of(record).and_then(|key| self.item_path(key)) {
            Ok(path) => path,
            Err(reason) => return Ok(PersistenceOutcome::Rejected { reason }),
        };

        let body = match serde_json::to_vec(record) {
            Ok(body) if body.len() > self.max_item_bytes => {
                return Ok(PersistenceOutcome::Rejected {
                    reason: "Item size has exceeded the maximum allowed size".to_string(),
                });
            }
            Ok(body) => body,
            Err(e) => {
                return Ok(PersistenceOutcome::Rejected {
                    reason: e.to_string(),
                });
            }
        };

        let result = self
            .storage
            .put_opts(
                &path,
                PutPayload::from(Bytes::from(body)),
                PutOptions::default(),
            )
            .await;

        match result {
            Ok(_) => {
                debug!("Stored item {}", path);
                Ok(PersistenceOutcome::Stored)
            }
            Err(err) => classify(&self.table, err),
        }
    }
}

/// Split store errors into per-record rejections and fatal failures.
pub fn classify(table: &str, err: object_store::Error) -> Result<PersistenceOutcome, StoreError> {
    match err {
        object_store::Error::InvalidPath { .. }
        | object_store::Error::Precondition { .. }
        | object_store::Error::AlreadyExists { .. }
        | object_store::Error::NotModified { .. } => Ok(PersistenceOutcome::Rejected {
            reason: err.to_string(),
        }),
        source => Err(source).context(UnreachableSnafu { table }),
    }
}

#[async_trait]
impl RecordStore for ObjectStoreTable {
    async fn store(&self, record: &Record) -> Result<PersistenceOutcome, StoreError> {
        let start = Instant::now();
        let result = self.put(record).await;
        emit!(StoreRequestDuration {
            duration: start.elapsed(),
        });
        result
    }
}
