//! flurry: validate a delimited file from object storage and load it into a
//! key-value table.
//!
//! Takes one storage event (from a file, stdin, or `--bucket`/`--key`), runs
//! the batch and publishes one notification. Exits non-zero when the run was
//! aborted.

use clap::Parser;
use snafu::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use flurry::error::{
    AddressParseSnafu, ConfigSnafu, EventInputSnafu, MetricsSnafu, NotifierSnafu, PipelineError,
};
use flurry::notify::{self, Notifier};
use flurry::{BatchOutcome, BatchRunner, Config, S3Event, metrics, pipeline};

/// Delimited file to key-value table batch loader.
#[derive(Parser, Debug)]
#[command(name = "flurry")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file. Built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage event JSON file, or `-` for stdin.
    #[arg(short, long, default_value = "-", conflicts_with = "bucket")]
    event: String,

    /// Bucket of the object to load (manual trigger).
    #[arg(long, requires = "key")]
    bucket: Option<String>,

    /// Key of the object to load (manual trigger).
    #[arg(long, requires = "bucket")]
    key: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Dry run - validate configuration without processing.
    #[arg(long)]
    dry_run: bool,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("flurry starting");

    let config = build_config(&args)?;

    if config.metrics.enabled {
        let addr = config.metrics.address.parse().context(AddressParseSnafu)?;
        metrics::init(addr).context(MetricsSnafu)?;
        debug!(
            "Metrics endpoint listening on http://{}/metrics",
            config.metrics.address
        );
    }

    if args.dry_run {
        info!("Dry run mode - validating configuration");
        info!("Inbound bucket: {}", config.source.bucket);
        info!("Source: {}", config.source.url_for(&config.source.bucket));
        info!("Table: {} at {}", config.sink.table, config.sink.path);
        info!("Key field: {}", config.sink.key_field);
        info!("Schema fields: {}", config.schema.fields.len());
        for field in &config.schema.fields {
            info!(
                "  - {}: {} (required={}, min_length={:?}, max_length={:?})",
                field.name,
                field.field_type.as_str(),
                field.required,
                field.min_length,
                field.max_length
            );
        }
        info!("Configuration is valid");
        return Ok(());
    }

    // Built first: every later failure still owes one notification.
    let notifier = notify::from_config(&config.notification).context(NotifierSnafu)?;

    let outcome = match run(&args, &config, notifier.clone()).await {
        Ok(outcome) => outcome,
        Err(e) => pipeline::abort(notifier.as_ref(), config.notification.topic.clone(), e).await,
    };

    let summary = outcome.result?;
    info!("Batch {} completed", outcome.batch_id);
    info!("  Records processed: {}", summary.total_records_processed);
    info!("  Records inserted: {}", summary.total_inserted_records);
    info!("  Records failed: {}", summary.total_failed_records);
    if summary.has_failures() {
        warn!(
            "  {} invalid, {} rejected by the table",
            summary.records_failed_due_to_validation,
            summary.records_failed_due_to_persistence()
        );
    }

    Ok(())
}

/// Build the runner, take the trigger event and handle it.
async fn run(
    args: &Args,
    config: &Config,
    notifier: Arc<dyn Notifier>,
) -> Result<BatchOutcome, PipelineError> {
    let runner = BatchRunner::with_notifier(config, notifier).await?;

    let outcome = match (&args.bucket, &args.key) {
        (Some(bucket), Some(key)) => runner.handle_event(&S3Event::for_object(bucket, key)).await,
        _ => {
            let raw = read_event(&args.event).await?;
            // Unparseable input still gets a run, which fails as a malformed event.
            let event = serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw));
            runner.handle(&event).await
        }
    };
    Ok(outcome)
}

/// Build configuration from arguments.
fn build_config(args: &Args) -> Result<Config, PipelineError> {
    match &args.config {
        Some(path) => Config::from_file(path).context(ConfigSnafu),
        None => Config::builtin().context(ConfigSnafu),
    }
}

/// Read the event document from a file or stdin.
async fn read_event(source: &str) -> Result<String, PipelineError> {
    if source == "-" {
        let mut raw = String::new();
        tokio::io::stdin()
            .read_to_string(&mut raw)
            .await
            .context(EventInputSnafu)?;
        Ok(raw)
    } else {
        tokio::fs::read_to_string(source)
            .await
            .context(EventInputSnafu)
    }
}
