//! S3 backend.
//!
//! Inbound buckets and the table both live here in production. The client
//! region is resolved once per provider: a region in the storage options
//! (which carries the configured `region`) wins over one named in the URL,
//! and `AWS_DEFAULT_REGION` is only the last resort.

use object_store::aws::{AmazonS3Builder, AmazonS3ConfigKey};
use object_store::path::Path;
use object_store::{ObjectStore, RetryConfig};
use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{S3ConfigSnafu, StorageError};

use super::{BackendConfig, StorageProvider};

/// S3 storage configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub bucket: String,
    pub key: Option<Path>,
}

impl S3Config {
    /// Location shown in logs and the provider's `Debug` output.
    fn canonical_url(&self) -> String {
        let base = match (&self.region, &self.endpoint) {
            (_, Some(endpoint)) => format!("s3::{}/{}", endpoint, self.bucket),
            (Some(region), _) => format!("https://s3.{}.amazonaws.com/{}", region, self.bucket),
            _ => format!("s3://{}", self.bucket),
        };
        match &self.key {
            Some(key) => format!("{base}/{key}"),
            None => base,
        }
    }
}

/// Pick the client region from options, then the URL, then the environment.
pub(super) fn resolve_region(
    url_region: Option<&str>,
    options: &HashMap<String, String>,
) -> Option<String> {
    options
        .iter()
        .find(|(key, _)| matches!(key.parse::<AmazonS3ConfigKey>(), Ok(AmazonS3ConfigKey::Region)))
        .map(|(_, value)| value.clone())
        .filter(|region| !region.is_empty())
        .or_else(|| url_region.map(str::to_string))
        .or_else(|| std::env::var("AWS_DEFAULT_REGION").ok())
}

impl StorageProvider {
    pub(super) async fn construct_s3(
        mut config: S3Config,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&config.bucket)
            .with_retry(RetryConfig::default());

        for (key, value) in &options {
            builder = builder.with_config(key.parse().context(S3ConfigSnafu)?, value.clone());
        }

        config.region = resolve_region(config.region.as_deref(), &options);
        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }

        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_virtual_hosted_style_request(false)
                .with_allow_http(true);
        }

        let canonical_url = config.canonical_url();
        debug!("S3 client for {}", canonical_url);

        let object_store: Arc<dyn ObjectStore> =
            Arc::new(builder.build().context(S3ConfigSnafu)?);

        Ok(Self {
            config: BackendConfig::S3(config),
            object_store,
            canonical_url,
            storage_options: options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_configured_region_wins_over_url_region() {
        let region = resolve_region(Some("us-east-1"), &options(&[("aws_region", "ap-south-1")]));
        assert_eq!(region.as_deref(), Some("ap-south-1"));
    }

    #[test]
    fn test_configured_region_wins_over_environment() {
        // AWS_DEFAULT_REGION is only consulted when nothing else names a region.
        let region = resolve_region(None, &options(&[("region", "eu-west-2")]));
        assert_eq!(region.as_deref(), Some("eu-west-2"));
    }

    #[test]
    fn test_url_region_used_without_option() {
        let region = resolve_region(Some("us-east-1"), &options(&[("aws_allow_http", "true")]));
        assert_eq!(region.as_deref(), Some("us-east-1"));
    }

    #[test]
    fn test_canonical_url() {
        let config = S3Config {
            endpoint: None,
            region: Some("ap-south-1".to_string()),
            bucket: "inbound-file-drop".to_string(),
            key: Some(Path::from("uploads")),
        };
        assert_eq!(
            config.canonical_url(),
            "https://s3.ap-south-1.amazonaws.com/inbound-file-drop/uploads"
        );
    }

    #[tokio::test]
    async fn test_provider_carries_configured_region() {
        let storage = StorageProvider::for_url_with_options(
            "https://s3.us-east-1.amazonaws.com/inbound-file-drop",
            options(&[("aws_region", "ap-south-1")]),
        )
        .await
        .unwrap();

        match storage.config() {
            BackendConfig::S3(s3) => assert_eq!(s3.region.as_deref(), Some("ap-south-1")),
            other => panic!("Expected S3 config, got {other:?}"),
        }
    }
}
