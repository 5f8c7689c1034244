use async_trait::async_trait;
use elevate_domain::Request;
use thiserror::Error;

/// Binding of one principal to a permission set on a target account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Principal id in the identity store.
    pub principal_id: String,
    /// Permission-set identifier to bind.
    pub permission_set_id: String,
    /// Account the binding applies to.
    pub target_account_id: String,
}

impl Assignment {
    /// Builds the assignment a request asks for.
    #[must_use]
    pub fn from_request(request: &Request) -> Self {
        Self {
            principal_id: request.user_id.clone(),
            permission_set_id: request.role_id.clone(),
            target_account_id: request.account_id.clone(),
        }
    }
}

/// Classified failure from the permission-assignment provider.
#[derive(Debug, Error)]
pub enum AccessProviderError {
    /// Provider rate limiting; safe to retry with backoff.
    #[error("access provider throttled the call: {0}")]
    Throttled(String),

    /// Provider temporarily unavailable; safe to retry with backoff.
    #[error("access provider unavailable: {0}")]
    Unavailable(String),

    /// Provider-side fault; safe to retry with backoff.
    #[error("access provider internal error: {0}")]
    Internal(String),

    /// Permanent failure (bad target, bad principal); retrying will not help.
    #[error("access provider terminal error: {0}")]
    Terminal(String),
}

impl AccessProviderError {
    /// Returns true for throttling-class errors worth another attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Throttled(_) | Self::Unavailable(_) | Self::Internal(_)
        )
    }
}

/// Port for granting and revoking time-boxed permission assignments.
///
/// Both operations are idempotent under retry: creating an assignment that
/// already exists and deleting one that is already gone are successes.
#[async_trait]
pub trait AccessProvider: Send + Sync {
    /// Creates the assignment.
    async fn grant(&self, assignment: &Assignment) -> Result<(), AccessProviderError>;

    /// Deletes the assignment; "not found" counts as success.
    async fn revoke(&self, assignment: &Assignment) -> Result<(), AccessProviderError>;
}
