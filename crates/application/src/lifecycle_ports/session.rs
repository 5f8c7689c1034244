use async_trait::async_trait;
use chrono::{DateTime, Utc};
use elevate_core::{AppResult, RequestId};
use elevate_domain::Session;

/// Store for elevated-access audit sessions.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persists one session opened at grant time.
    async fn create(&self, session: Session) -> AppResult<()>;

    /// Closes the open session of one request; the record is immutable
    /// afterwards.
    async fn close(&self, request_id: RequestId, end_time: DateTime<Utc>) -> AppResult<()>;
}
