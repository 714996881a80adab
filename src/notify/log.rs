use async_trait::async_trait;
use snafu::prelude::*;
use tracing::info;

use super::{Notification, Notifier};
use crate::error::{NotificationSerializeSnafu, NotifyError};

/// Writes notifications to the log. Used when no endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, notification: &Notification) -> Result<(), NotifyError> {
        let body = serde_json::to_string(notification).context(NotificationSerializeSnafu)?;
        info!(subject = %notification.subject, "{}", body);
        Ok(())
    }
}
