//! Batch notifications.
//!
//! Every run publishes exactly one [`Notification`]: the batch summary when
//! the run completed, or the error that aborted it. Delivery is best-effort.

mod log;
mod webhook;

pub use log::LogNotifier;
pub use webhook::WebhookNotifier;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::NotificationConfig;
use crate::emit;
use crate::error::NotifyError;
use crate::metrics::events::{NotificationSent, RequestStatus};
use crate::pipeline::BatchSummary;

/// Body of a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotificationMessage {
    Summary(BatchSummary),
    Failure(String),
}

/// The single message published at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub batch_id: String,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub message: NotificationMessage,
}

impl Notification {
    fn new(batch_id: &str, topic: Option<String>, message: NotificationMessage) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            subject: format!("Batch processing notification: {batch_id}"),
            topic,
            timestamp: Utc::now(),
            message,
        }
    }

    /// Notification for a completed run.
    pub fn summary(batch_id: &str, topic: Option<String>, summary: BatchSummary) -> Self {
        Self::new(batch_id, topic, NotificationMessage::Summary(summary))
    }

    /// Notification for an aborted run.
    pub fn failure(batch_id: &str, topic: Option<String>, message: impl Into<String>) -> Self {
        Self::new(batch_id, topic, NotificationMessage::Failure(message.into()))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.message, NotificationMessage::Failure(_))
    }
}

/// A channel notifications are published to.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Build the notifier for `config`: a webhook when a URL is set, the log
/// otherwise.
pub fn from_config(config: &NotificationConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    match &config.webhook_url {
        Some(url) => Ok(Arc::new(WebhookNotifier::from_config(url, config)?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}

/// Publish `notification`, logging instead of failing.
///
/// Returns whether delivery succeeded.
pub async fn deliver(notifier: &dyn Notifier, notification: &Notification) -> bool {
    match notifier.publish(notification).await {
        Ok(()) => {
            emit!(NotificationSent {
                status: RequestStatus::Success,
            });
            info!(
                topic = notification.topic.as_deref().unwrap_or_default(),
                "Notification sent"
            );
            true
        }
        Err(e) => {
            emit!(NotificationSent {
                status: RequestStatus::Error,
            });
            error!("Unable to publish notification: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ErrorDetail;

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn publish(&self, _: &Notification) -> Result<(), NotifyError> {
            Err(NotifyError::Status {
                status: 503,
                body: "unavailable".to_string(),
            })
        }
    }

    #[test]
    fn test_summary_envelope() {
        let summary = BatchSummary {
            total_records_processed: 2,
            total_inserted_records: 1,
            total_failed_records: 1,
            records_failed_due_to_validation: 1,
            error_details: vec![ErrorDetail {
                row: 2,
                message: "course must NOT have fewer than 5 characters".to_string(),
            }],
        };
        let notification = Notification::summary("b-1", Some("arn:topic".to_string()), summary);

        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["subject"], "Batch processing notification: b-1");
        assert_eq!(json["topic"], "arn:topic");
        assert_eq!(json["message"]["totalRecordsProcessed"], 2);
        assert_eq!(json["message"]["errorDetails"][0]["row"], 2);
        assert!(!notification.is_failure());
    }

    #[test]
    fn test_failure_envelope() {
        let notification = Notification::failure("b-2", None, "Unable to read s3://a/b");
        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["message"], "Unable to read s3://a/b");
        assert!(json.get("topic").is_none());
        assert!(notification.is_failure());
    }

    #[tokio::test]
    async fn test_deliver_swallows_errors() {
        let notification = Notification::failure("b-3", None, "boom");
        assert!(!deliver(&FailingNotifier, &notification).await);
        assert!(deliver(&LogNotifier, &notification).await);
    }
}
