//! Reading inbound objects.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use tracing::debug;

use crate::config::SourceConfig;
use crate::error::StorageError;
use crate::event::SourceObject;

use super::StorageProvider;

/// Opens the byte stream of an inbound object.
#[async_trait]
pub trait ObjectSource: Send + Sync {
    /// Read the whole object.
    async fn open(&self, object: &SourceObject) -> Result<Bytes, StorageError>;
}

/// [`ObjectSource`] that resolves each bucket to a storage provider.
///
/// A bucket maps to `source.url` when one is configured, otherwise to
/// `s3://<bucket>`.
#[derive(Debug, Clone)]
pub struct BucketSource {
    config: SourceConfig,
    region: Option<String>,
}

impl BucketSource {
    pub fn new(config: SourceConfig, region: Option<String>) -> Self {
        Self { config, region }
    }

    fn options(&self) -> HashMap<String, String> {
        let mut options = self.config.storage_options.clone();
        if let Some(region) = &self.region
            && !options.keys().any(|k| k.ends_with("region"))
        {
            options.insert("aws_region".to_string(), region.clone());
        }
        options
    }

    async fn provider(&self, bucket: &str) -> Result<StorageProvider, StorageError> {
        StorageProvider::for_url_with_options(&self.config.url_for(bucket), self.options()).await
    }
}

#[async_trait]
impl ObjectSource for BucketSource {
    async fn open(&self, object: &SourceObject) -> Result<Bytes, StorageError> {
        let provider = self.provider(&object.bucket).await?;
        debug!("Reading {} from {:?}", object.key, provider);
        provider.get(object.key.as_str()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn local_source(dir: &TempDir) -> BucketSource {
        BucketSource::new(
            SourceConfig {
                bucket: "inbound".to_string(),
                url: Some(dir.path().display().to_string()),
                storage_options: HashMap::new(),
            },
            Some("ap-south-1".to_string()),
        )
    }

    #[tokio::test]
    async fn test_open_reads_object_bytes() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("uploads")).unwrap();
        std::fs::write(dir.path().join("uploads/students.csv"), b"student_id\nS12345\n").unwrap();

        let source = local_source(&dir);
        let bytes = source
            .open(&SourceObject {
                bucket: "inbound".to_string(),
                key: "uploads/students.csv".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(bytes.as_ref(), b"student_id\nS12345\n");
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = local_source(&dir)
            .open(&SourceObject {
                bucket: "inbound".to_string(),
                key: "missing.csv".to_string(),
            })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_region_is_added_unless_configured() {
        let dir = TempDir::new().unwrap();
        let source = local_source(&dir);
        assert_eq!(
            source.options().get("aws_region").map(String::as_str),
            Some("ap-south-1")
        );

        let mut config = source.config.clone();
        config
            .storage_options
            .insert("aws_region".to_string(), "eu-west-1".to_string());
        let source = BucketSource::new(config, Some("ap-south-1".to_string()));
        assert_eq!(
            source.options().get("aws_region").map(String::as_str),
            Some("eu-west-1")
        );
    }
}
