//! flurry: load delimited files dropped into object storage into a
//! key-value table.
//!
//! A run is triggered by a storage event for one object. The object is
//! decoded into records, every record is validated against a schema and
//! the valid ones are stored one at a time. Failures are counted per row and
//! never abort the batch; the run ends with exactly one notification carrying
//! the summary, or the error that aborted it.
//!
//! # Example
//!
//! ```ignore
//! use flurry::{BatchRunner, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), flurry::error::PipelineError> {
//!     let config = Config::from_file("flurry.yaml").context(ConfigSnafu)?;
//!     let runner = BatchRunner::from_config(&config).await?;
//!     let outcome = runner.handle(&event).await;
//!     println!("{:?}", outcome.result);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dlq;
pub mod error;
pub mod event;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod record;
pub mod schema;
pub mod sink;
pub mod source;
pub mod storage;

pub use config::Config;
pub use event::{S3Event, SourceObject};
pub use pipeline::{BatchOutcome, BatchProcessor, BatchRunner, BatchSummary, ErrorDetail};
pub use record::Record;
pub use schema::RecordSchema;
pub use storage::{StorageProvider, StorageProviderRef};
