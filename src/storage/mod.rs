//! Object storage abstraction.
//!
//! Provides a unified interface over S3 and the local filesystem, plus the
//! [`ObjectSource`] seam the pipeline reads inbound files through.

mod local;
mod s3;
mod source;

pub use local::LocalConfig;
pub use s3::S3Config;
pub use source::{BucketSource, ObjectSource};

use bytes::Bytes;
use object_store::path::Path;
use object_store::{ObjectStore, PutOptions, PutPayload, PutResult};
use regex::Regex;
use snafu::prelude::*;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use crate::emit;
use crate::error::{InvalidUrlSnafu, ObjectStoreSnafu, StorageError};
use crate::metrics::events::{
    RequestStatus, StorageOperation, StorageRequest, StorageRequestDuration,
};

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// Storage provider that abstracts over different storage backends.
#[derive(Clone)]
pub struct StorageProvider {
    pub(crate) config: BackendConfig,
    pub(crate) object_store: Arc<dyn ObjectStore>,
    pub(crate) canonical_url: String,
    pub(crate) storage_options: HashMap<String, String>,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

// URL patterns for the supported backends
const S3_PATH: &str =
    r"^https://s3\.(?P<region>[\w\-]+)\.amazonaws\.com/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_VIRTUAL: &str =
    r"^https://(?P<bucket>[a-z0-9\-\.]+)\.s3\.(?P<region>[\w\-]+)\.amazonaws\.com(/(?P<key>.+))?$";
const S3_URL: &str = r"^[sS]3[aA]?://(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_ENDPOINT_URL: &str = r"^[sS]3[aA]?::(?<protocol>https?)://(?P<endpoint>[^:/]+):(?<port>\d+)/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";

const FILE_URI: &str = r"^file://(?P<path>.*)$";
const FILE_URL: &str = r"^file:(?P<path>.*)$";
const FILE_PATH: &str = r"^/(?P<path>.*)$";

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
enum Backend {
    S3,
    Local,
}

fn matchers() -> &'static [(Backend, Vec<Regex>)] {
    static MATCHERS: OnceLock<Vec<(Backend, Vec<Regex>)>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        vec![
            (
                Backend::S3,
                vec![
                    Regex::new(S3_PATH).unwrap(),
                    Regex::new(S3_VIRTUAL).unwrap(),
                    Regex::new(S3_ENDPOINT_URL).unwrap(),
                    Regex::new(S3_URL).unwrap(),
                ],
            ),
            (
                Backend::Local,
                vec![
                    Regex::new(FILE_URI).unwrap(),
                    Regex::new(FILE_URL).unwrap(),
                    Regex::new(FILE_PATH).unwrap(),
                ],
            ),
        ]
    })
}

/// Backend configuration enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Local(LocalConfig),
    /// A store handed in directly, e.g. an in-memory store.
    Custom { label: String },
}

impl BackendConfig {
    /// Parse a URL into a backend configuration.
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        for (backend, patterns) in matchers() {
            if let Some(matches) = patterns.iter().find_map(|r| r.captures(url)) {
                return match backend {
                    Backend::S3 => Ok(Self::parse_s3(matches)),
                    Backend::Local => Ok(Self::parse_local(matches)),
                };
            }
        }

        InvalidUrlSnafu {
            url: url.to_string(),
        }
        .fail()
    }

    fn parse_s3(matches: regex::Captures) -> Self {
        let bucket = matches
            .name("bucket")
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        let region = matches.name("region").map(|m| m.as_str().to_string());

        let endpoint = std::env::var("AWS_ENDPOINT").ok().or_else(|| {
            matches.name("endpoint").map(|endpoint| {
                let port = matches
                    .name("port")
                    .and_then(|p| p.as_str().parse::<u16>().ok())
                    .unwrap_or(443);
                let protocol = matches
                    .name("protocol")
                    .map(|p| p.as_str())
                    .unwrap_or("https");
                format!("{}://{}:{}", protocol, endpoint.as_str(), port)
            })
        });

        let key = matches.name("key").map(|m| m.as_str().into());

        BackendConfig::S3(S3Config {
            endpoint,
            region,
            bucket,
            key,
        })
    }

    fn parse_local(matches: regex::Captures) -> Self {
        let path = matches.name("path").map(|m| m.as_str()).unwrap_or_default();
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        BackendConfig::Local(LocalConfig { path, key: None })
    }

    pub(crate) fn key(&self) -> Option<&Path> {
        match self {
            BackendConfig::S3(s3) => s3.key.as_ref(),
            BackendConfig::Local(local) => local.key.as_ref(),
            BackendConfig::Custom { .. } => None,
        }
    }
}

impl StorageProvider {
    /// Create a storage provider for the given URL with storage options.
    pub async fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        match BackendConfig::parse_url(url)? {
            BackendConfig::S3(config) => Self::construct_s3(config, options).await,
            BackendConfig::Local(config) => Self::construct_local(config, options).await,
            BackendConfig::Custom { label } => InvalidUrlSnafu { url: label }.fail(),
        }
    }

    /// Wrap an already-built store.
    pub fn with_store(label: impl Into<String>, object_store: Arc<dyn ObjectStore>) -> Self {
        let label = label.into();
        Self {
            canonical_url: label.clone(),
            config: BackendConfig::Custom { label },
            object_store,
            storage_options: HashMap::new(),
        }
    }

    /// Get the contents of a file.
    pub async fn get(&self, path: impl Into<Path>) -> Result<Bytes, StorageError> {
        let path = path.into();
        let start = Instant::now();
        let result = self.object_store.get(&self.qualify_path(&path)).await;

        emit!(StorageRequest {
            operation: StorageOperation::Get,
            status: RequestStatus::from_ok(result.is_ok()),
        });
        emit!(StorageRequestDuration {
            operation: StorageOperation::Get,
            duration: start.elapsed(),
        });

        let bytes = result
            .context(ObjectStoreSnafu)?
            .bytes()
            .await
            .context(ObjectStoreSnafu)?;
        Ok(bytes)
    }

    /// Put a payload to a path.
    pub async fn put_payload(&self, path: &Path, payload: PutPayload) -> Result<(), StorageError> {
        self.put_opts(path, payload, PutOptions::default())
            .await
            .context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Put a payload with explicit options.
    ///
    /// Returns the raw `object_store` error so callers can tell rejections
    /// apart from connectivity problems.
    pub async fn put_opts(
        &self,
        path: &Path,
        payload: PutPayload,
        opts: PutOptions,
    ) -> object_store::Result<PutResult> {
        let path = self.qualify_path(path);
        let start = Instant::now();
        let result = self.object_store.put_opts(&path, payload, opts).await;

        emit!(StorageRequest {
            operation: StorageOperation::Put,
            status: RequestStatus::from_ok(result.is_ok()),
        });
        emit!(StorageRequestDuration {
            operation: StorageOperation::Put,
            duration: start.elapsed(),
        });

        result
    }

    /// Qualify a path with the configured key prefix.
    pub fn qualify_path<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        match self.config.key() {
            Some(prefix) => Cow::Owned(prefix.parts().chain(path.parts()).collect()),
            None => Cow::Borrowed(path),
        }
    }

    /// Storage options the provider was built with.
    pub fn storage_options(&self) -> &HashMap<String, String> {
        &self.storage_options
    }

    /// Get the backend configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Human-readable location of the provider.
    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use tempfile::TempDir;

    #[test]
    fn test_s3_url_parsing() {
        let config = BackendConfig::parse_url("s3://inbound-file-drop/uploads").unwrap();
        match config {
            BackendConfig::S3(s3) => {
                assert_eq!(s3.bucket, "inbound-file-drop");
                assert_eq!(s3.key, Some(Path::from("uploads")));
            }
            _ => panic!("Expected S3 config"),
        }
    }

    #[test]
    fn test_s3_endpoint_url_parsing() {
        let config =
            BackendConfig::parse_url("s3::http://localhost:4566/inbound-file-drop").unwrap();
        match config {
            BackendConfig::S3(s3) => {
                assert_eq!(s3.bucket, "inbound-file-drop");
                assert!(s3.endpoint.is_some());
                assert_eq!(s3.key, None);
            }
            _ => panic!("Expected S3 config"),
        }
    }

    #[test]
    fn test_local_url_parsing() {
        for url in ["/var/lib/flurry/tables", "file:///var/lib/flurry/tables"] {
            match BackendConfig::parse_url(url).unwrap() {
                BackendConfig::Local(local) => assert_eq!(local.path, "/var/lib/flurry/tables"),
                other => panic!("Expected Local config, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_unsupported_url() {
        let err = BackendConfig::parse_url("ftp://example.com/data").unwrap_err();
        assert!(matches!(err, StorageError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_local_put_get_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let url = format!("{}/nested/root", temp_dir.path().display());
        let storage = StorageProvider::for_url_with_options(&url, HashMap::new())
            .await
            .unwrap();

        let path = Path::from("reports/summary.json");
        storage
            .put_payload(&path, PutPayload::from(Bytes::from_static(b"{}")))
            .await
            .unwrap();

        let content = storage.get(path).await.unwrap();
        assert_eq!(content.as_ref(), b"{}");
        assert!(temp_dir.path().join("nested/root/reports/summary.json").exists());
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let storage = StorageProvider::with_store("memory", Arc::new(InMemory::new()));
        assert_eq!(storage.canonical_url(), "memory");
        assert!(matches!(storage.config(), BackendConfig::Custom { .. }));
        assert!(storage.storage_options().is_empty());
        let err = storage.get("students.csv").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
