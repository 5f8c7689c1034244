use async_trait::async_trait;
use chrono::{DateTime, Utc};
use elevate_core::{AppResult, RequestId};

/// One change event the dispatcher gave up on.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetterEntry {
    /// Feed event id that exhausted its retries.
    pub event_id: String,
    /// Request the event belonged to.
    pub request_id: RequestId,
    /// Why dispatch kept failing.
    pub reason: String,
    /// When the dispatcher gave up.
    pub occurred_at: DateTime<Utc>,
}

/// Operator-visible channel for events the dispatcher could not handle.
///
/// Nothing is silently dropped: an event that exhausts its dispatch retries
/// lands here for manual replay.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Records one abandoned event.
    async fn publish(&self, entry: DeadLetterEntry) -> AppResult<()>;
}
