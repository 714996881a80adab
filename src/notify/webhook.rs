//! HTTP webhook delivery.

use async_trait::async_trait;
use reqwest::Client;
use snafu::prelude::*;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::{Notification, Notifier};
use crate::config::NotificationConfig;
use crate::error::{ClientBuildSnafu, NotifyError, RequestSnafu, StatusSnafu};

/// Posts each notification as JSON to a fixed URL.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
    headers: HashMap<String, String>,
}

impl WebhookNotifier {
    pub fn new(
        url: impl Into<String>,
        timeout: Duration,
        headers: HashMap<String, String>,
    ) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context(ClientBuildSnafu)?;

        Ok(Self {
            client,
            url: url.into(),
            headers,
        })
    }

    pub fn from_config(url: &str, config: &NotificationConfig) -> Result<Self, NotifyError> {
        Self::new(
            url,
            Duration::from_secs(config.timeout_secs),
            config.headers.clone(),
        )
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn publish(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut request = self.client.post(&self.url).json(notification);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request.send().await.context(RequestSnafu)?;
        let status = response.status();
        debug!("Webhook {} answered {}", self.url, status);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return StatusSnafu {
                status: status.as_u16(),
                body,
            }
            .fail();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::{Json, Router, extract::State, routing::post};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    type Received = Arc<Mutex<Vec<(Option<String>, serde_json::Value)>>>;

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/notify")
    }

    #[tokio::test]
    async fn test_posts_json_with_headers() {
        let received: Received = Arc::default();
        let router = Router::new()
            .route(
                "/notify",
                post(
                    |State(received): State<Received>,
                     headers: HeaderMap,
                     Json(body): Json<serde_json::Value>| async move {
                        let token = headers
                            .get("x-api-key")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        received.lock().unwrap().push((token, body));
                        StatusCode::OK
                    },
                ),
            )
            .with_state(received.clone());
        let url = serve(router).await;

        let headers = HashMap::from([("x-api-key".to_string(), "secret".to_string())]);
        let notifier = WebhookNotifier::new(url, Duration::from_secs(5), headers).unwrap();
        notifier
            .publish(&Notification::failure("b-1", None, "boom"))
            .await
            .unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0.as_deref(), Some("secret"));
        assert_eq!(received[0].1["batch_id"], "b-1");
        assert_eq!(received[0].1["message"], "boom");
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let router = Router::new().route(
            "/notify",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "down") }),
        );
        let url = serve(router).await;

        let notifier = WebhookNotifier::new(url, Duration::from_secs(5), HashMap::new()).unwrap();
        let err = notifier
            .publish(&Notification::failure("b-2", None, "boom"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NotifyError::Status { status: 500, ref body } if body == "down"
        ));
    }
}
