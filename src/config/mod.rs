//! Configuration parsing.
//!
//! Loads the run configuration from YAML (with environment variable
//! interpolation) into one explicit [`Config`] value that is passed to each
//! component when it is constructed.

mod vars;

pub use vars::{InterpolationResult, interpolate, interpolate_with};

use serde::{Deserialize, Deserializer, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{
    ConfigError, EmptyInboundBucketSnafu, EmptySinkPathSnafu, EmptyTableSnafu,
    EnvInterpolationSnafu, InvalidDelimiterSnafu, ReadFileSnafu, SchemaSnafu,
    UnknownKeyFieldSnafu, YamlParseSnafu,
};
use crate::schema::RecordSchema;

/// Byte size constants (binary/IEC units).
pub const KB: usize = 1024;
pub const MB: usize = 1024 * KB;

/// Configuration used when no file is given.
const BUILTIN_CONFIG: &str = include_str!("defaults.yaml");

/// Main configuration structure for a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Default region for cloud clients.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub region: Option<String>,
    pub source: SourceConfig,
    #[serde(default)]
    pub decode: DecodeConfig,
    pub schema: SchemaConfig,
    pub sink: SinkConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub error_handling: ErrorHandlingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Where inbound files come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Bucket whose events this pipeline accepts.
    pub bucket: String,

    /// Storage URL that the inbound bucket maps to.
    ///
    /// Defaults to `s3://<bucket>`. Set it to read from another backend,
    /// e.g. a local directory or an S3-compatible endpoint.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub url: Option<String>,

    /// Storage options (credentials, endpoint, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

impl SourceConfig {
    /// Storage URL for the given bucket.
    pub fn url_for(&self, bucket: &str) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!("s3://{bucket}"),
        }
    }
}

/// How delimited input is decoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeConfig {
    /// Field delimiter (default: ",").
    #[serde(default = "default_delimiter")]
    pub delimiter: String,

    /// Trim whitespace around every cell (default: true).
    #[serde(default = "default_trim")]
    pub trim: bool,

    /// Columns to retain. Defaults to the schema's field names.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            trim: default_trim(),
            columns: None,
        }
    }
}

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_trim() -> bool {
    true
}

impl DecodeConfig {
    /// The delimiter as a single byte.
    pub fn delimiter_byte(&self) -> Result<u8, ConfigError> {
        match self.delimiter.as_bytes() {
            [b] if b.is_ascii() => Ok(*b),
            _ => InvalidDelimiterSnafu {
                delimiter: self.delimiter.clone(),
            }
            .fail(),
        }
    }

    /// Columns kept from each row.
    pub fn retained_columns(&self, schema: &SchemaConfig) -> Vec<String> {
        match &self.columns {
            Some(columns) => columns.clone(),
            None => schema.fields.iter().map(|f| f.name.clone()).collect(),
        }
    }
}

/// Schema configuration describing a valid record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub fields: Vec<FieldConfig>,
}

/// Configuration for a single schema field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    /// Whether the field must be present in every record.
    #[serde(default)]
    pub required: bool,
    /// Minimum length in characters.
    #[serde(default)]
    pub min_length: Option<usize>,
    /// Maximum length in characters.
    #[serde(default)]
    pub max_length: Option<usize>,
}

/// Value types a field can be checked against.
///
/// Decoded cells are always text; non-string types mean "parses as".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
        }
    }
}

/// Key-value table that valid records are written to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Storage URL that holds the tables.
    /// Examples: "s3://bucket/tables", "/var/lib/flurry/tables"
    pub path: String,

    /// Table name; items live under `<path>/<table>/`.
    pub table: String,

    /// Field whose value keys each item.
    pub key_field: String,

    /// Largest serialized item the table accepts (default: 400 KiB).
    #[serde(default = "default_max_item_bytes")]
    pub max_item_bytes: usize,

    /// Storage options (credentials, region, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

fn default_max_item_bytes() -> usize {
    400 * KB
}

/// Where the run notification goes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Topic identifier carried in the notification.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub topic: Option<String>,

    /// HTTP endpoint that receives the notification.
    /// When unset, notifications are written to the log.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub webhook_url: Option<String>,

    /// Request timeout in seconds (default: 10).
    #[serde(default = "default_notification_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra HTTP headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            topic: None,
            webhook_url: None,
            timeout_secs: default_notification_timeout_secs(),
            headers: HashMap::new(),
        }
    }
}

fn default_notification_timeout_secs() -> u64 {
    10
}

/// Error handling configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorHandlingConfig {
    /// Location for the rejected-records log. Disabled when unset.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub dlq_path: Option<String>,
    /// Storage options for the rejected-records log.
    #[serde(default)]
    pub dlq_storage_options: HashMap<String, String>,
}

/// Metrics configuration for Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether the metrics endpoint is served (default: false).
    #[serde(default)]
    pub enabled: bool,
    /// Address to bind the metrics HTTP server (default: "0.0.0.0:9090").
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

/// Interpolated values can come out empty; treat those as unset.
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.trim().is_empty()))
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).context(ReadFileSnafu)?;
        Self::parse(&content)
    }

    /// The built-in configuration, interpolated from the environment.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::parse(BUILTIN_CONFIG)
    }

    /// Interpolate, parse and validate a YAML document.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let result = interpolate(content);
        if !result.is_ok() {
            let error_msg = result.errors.join("\n");
            return EnvInterpolationSnafu { message: error_msg }.fail();
        }

        let config: Config = serde_yaml::from_str(&result.text).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.source.bucket.is_empty(), EmptyInboundBucketSnafu);
        ensure!(!self.sink.path.is_empty(), EmptySinkPathSnafu);
        ensure!(!self.sink.table.is_empty(), EmptyTableSnafu);
        ensure!(
            self.schema.fields.iter().any(|f| f.name == self.sink.key_field),
            UnknownKeyFieldSnafu {
                field: self.sink.key_field.clone(),
            }
        );
        self.decode.delimiter_byte()?;
        RecordSchema::compile(&self.schema).context(SchemaSnafu)?;
        Ok(())
    }
}
