use async_trait::async_trait;
use elevate_application::{NotificationEvent, Notifier};
use elevate_core::{AppError, AppResult};
use serde_json::json;

/// Notifier posting lifecycle events to a webhook endpoint.
pub struct WebhookNotifier {
    http_client: reqwest::Client,
    endpoint: String,
}

impl WebhookNotifier {
    /// Creates a webhook notifier for one endpoint.
    #[must_use]
    pub fn new(http_client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http_client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: NotificationEvent) -> AppResult<()> {
        let payload = json!({
            "event": event.kind.as_str(),
            "recipients": event.recipients(),
            "request": event.request,
        });

        let response = self
            .http_client
            .post(self.endpoint.as_str())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                AppError::Internal(format!("webhook notification transport error: {error}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<response body unavailable>".to_owned());
            return Err(AppError::Internal(format!(
                "webhook endpoint returned status {status}: {body}"
            )));
        }

        Ok(())
    }
}
