use async_trait::async_trait;
use elevate_application::{AccessProvider, AccessProviderError, Assignment};
use serde_json::json;

/// Connection settings for the HTTP access provider.
#[derive(Clone)]
pub struct HttpAccessProviderConfig {
    /// Base URL of the identity provider's admin API.
    pub base_url: String,
    /// Identity-store instance the assignments are managed in.
    pub instance_id: String,
    /// Bearer token for the admin API.
    pub api_token: String,
}

/// HTTP client for the permission-assignment provider's admin API.
///
/// Error classification follows the provider contract: 429 is throttling,
/// 503 is unavailability, other 5xx are internal faults (all retryable at
/// the call site); a 409 on create and a 404 on delete are idempotent
/// successes; everything else is terminal.
pub struct HttpAccessProvider {
    http_client: reqwest::Client,
    config: HttpAccessProviderConfig,
}

impl HttpAccessProvider {
    /// Creates an access provider client.
    #[must_use]
    pub fn new(http_client: reqwest::Client, config: HttpAccessProviderConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    fn assignments_url(&self) -> String {
        format!(
            "{}/instances/{}/assignments",
            self.config.base_url.trim_end_matches('/'),
            self.config.instance_id
        )
    }

    fn classify_status(
        status: reqwest::StatusCode,
        body: String,
    ) -> Result<(), AccessProviderError> {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AccessProviderError::Throttled(body));
        }
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return Err(AccessProviderError::Unavailable(body));
        }
        if status.is_server_error() {
            return Err(AccessProviderError::Internal(format!(
                "provider returned status {status}: {body}"
            )));
        }
        Err(AccessProviderError::Terminal(format!(
            "provider returned status {status}: {body}"
        )))
    }
}

#[async_trait]
impl AccessProvider for HttpAccessProvider {
    async fn grant(&self, assignment: &Assignment) -> Result<(), AccessProviderError> {
        let response = self
            .http_client
            .post(self.assignments_url())
            .bearer_auth(self.config.api_token.as_str())
            .json(&json!({
                "principalId": assignment.principal_id,
                "permissionSetId": assignment.permission_set_id,
                "targetAccountId": assignment.target_account_id,
            }))
            .send()
            .await
            .map_err(|error| {
                AccessProviderError::Unavailable(format!("transport error: {error}"))
            })?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::CONFLICT {
            // An assignment that already exists satisfies the grant.
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<response body unavailable>".to_owned());
        Self::classify_status(status, body)
    }

    async fn revoke(&self, assignment: &Assignment) -> Result<(), AccessProviderError> {
        let response = self
            .http_client
            .delete(self.assignments_url())
            .bearer_auth(self.config.api_token.as_str())
            .json(&json!({
                "principalId": assignment.principal_id,
                "permissionSetId": assignment.permission_set_id,
                "targetAccountId": assignment.target_account_id,
            }))
            .send()
            .await
            .map_err(|error| {
                AccessProviderError::Unavailable(format!("transport error: {error}"))
            })?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            // An assignment that is already gone satisfies the revoke.
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<response body unavailable>".to_owned());
        Self::classify_status(status, body)
    }
}
