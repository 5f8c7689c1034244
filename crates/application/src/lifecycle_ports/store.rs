use async_trait::async_trait;
use elevate_core::{AppResult, RequestId};
use elevate_domain::{Request, RequestPatch, RequestStatus};

/// One page of request records from an indexed query.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestPage {
    /// Records in this page.
    pub items: Vec<Request>,
    /// Continuation token for the next page, when more records exist.
    pub next_token: Option<String>,
}

/// Repository port for the durable request table.
#[async_trait]
pub trait RequestRepository: Send + Sync {
    /// Returns one request by id.
    async fn get(&self, id: RequestId) -> AppResult<Option<Request>>;

    /// Persists a new request record.
    async fn create(&self, request: Request) -> AppResult<()>;

    /// Applies a last-write-wins partial update and returns the new image.
    async fn update(&self, id: RequestId, patch: RequestPatch) -> AppResult<Request>;

    /// Lists requests for one requester, optionally filtered by status.
    async fn query_by_email_and_status(
        &self,
        email: &str,
        status: Option<RequestStatus>,
        page_token: Option<String>,
    ) -> AppResult<RequestPage>;

    /// Lists requests assigned to one approver, optionally filtered by status.
    async fn query_by_approver_and_status(
        &self,
        approver_id: &str,
        status: Option<RequestStatus>,
        page_token: Option<String>,
    ) -> AppResult<RequestPage>;
}

/// One mutation observed on the request table.
///
/// Delivered at least once, ordered per request id. `old` is absent for
/// inserts. `delivery_count` counts how often this event has been handed
/// out, so consumers can bound redelivery.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestChangeEvent {
    /// Stable event identifier used for ack/release.
    pub event_id: String,
    /// Record image before the mutation, absent on insert.
    pub old: Option<Request>,
    /// Record image after the mutation.
    pub new: Request,
    /// Number of times this event has been delivered.
    pub delivery_count: u32,
}

/// Change-feed port over the request table.
#[async_trait]
pub trait RequestChangeFeed: Send + Sync {
    /// Returns the next batch of undelivered or redeliverable events.
    async fn poll(&self, limit: usize) -> AppResult<Vec<RequestChangeEvent>>;

    /// Marks one event as handled; it will not be delivered again.
    async fn ack(&self, event_id: &str) -> AppResult<()>;

    /// Returns one event to the feed for redelivery.
    async fn release(&self, event_id: &str) -> AppResult<()>;
}

/// Checkpoint port used by every workflow to persist status and timestamps.
#[async_trait]
pub trait StatusUpdater: Send + Sync {
    /// Applies a partial update to one request record.
    async fn update(&self, request_id: RequestId, patch: RequestPatch) -> AppResult<()>;
}
