use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use elevate_application::{
    RequestChangeEvent, RequestChangeFeed, RequestPage, RequestRepository, StatusUpdater,
};
use elevate_core::{AppError, AppResult, RequestId};
use elevate_domain::{Request, RequestPatch, RequestStatus};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct StoredEvent {
    id: u64,
    old: Option<Request>,
    new: Request,
    delivery_count: u32,
    acked: bool,
    in_flight: bool,
}

#[derive(Default)]
struct Inner {
    requests: HashMap<RequestId, Request>,
    events: Vec<StoredEvent>,
    next_event_id: u64,
}

/// In-memory request table with a change feed, for tests and local runs.
///
/// Mirrors the transactional semantics of the Postgres adapter: every
/// mutation records an old/new image pair that the feed delivers at least
/// once, in write order.
#[derive(Clone, Default)]
pub struct InMemoryRequestStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryRequestStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns one record without touching the feed; test helper.
    pub async fn snapshot(&self, id: RequestId) -> Option<Request> {
        self.inner.lock().await.requests.get(&id).cloned()
    }
}

impl Inner {
    fn push_event(&mut self, old: Option<Request>, new: Request) {
        self.next_event_id += 1;
        self.events.push(StoredEvent {
            id: self.next_event_id,
            old,
            new,
            delivery_count: 0,
            acked: false,
            in_flight: false,
        });
    }
}

#[async_trait]
impl RequestRepository for InMemoryRequestStore {
    async fn get(&self, id: RequestId) -> AppResult<Option<Request>> {
        Ok(self.inner.lock().await.requests.get(&id).cloned())
    }

    async fn create(&self, request: Request) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.requests.contains_key(&request.id) {
            return Err(AppError::Conflict(format!(
                "request '{}' already exists",
                request.id
            )));
        }
        inner.requests.insert(request.id, request.clone());
        inner.push_event(None, request);
        Ok(())
    }

    async fn update(&self, id: RequestId, patch: RequestPatch) -> AppResult<Request> {
        let mut inner = self.inner.lock().await;
        let request = inner
            .requests
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("request '{id}' does not exist")))?;

        let mut updated = request.clone();
        patch.apply(&mut updated)?;

        inner.requests.insert(id, updated.clone());
        inner.push_event(Some(request), updated.clone());
        Ok(updated)
    }

    async fn query_by_email_and_status(
        &self,
        email: &str,
        status: Option<RequestStatus>,
        _page_token: Option<String>,
    ) -> AppResult<RequestPage> {
        let inner = self.inner.lock().await;
        let items = inner
            .requests
            .values()
            .filter(|request| request.email == email)
            .filter(|request| status.is_none_or(|wanted| request.status == wanted))
            .cloned()
            .collect();
        Ok(RequestPage {
            items,
            next_token: None,
        })
    }

    async fn query_by_approver_and_status(
        &self,
        approver_id: &str,
        status: Option<RequestStatus>,
        _page_token: Option<String>,
    ) -> AppResult<RequestPage> {
        let inner = self.inner.lock().await;
        let items = inner
            .requests
            .values()
            .filter(|request| {
                request
                    .approver_ids
                    .iter()
                    .any(|candidate| candidate == approver_id)
            })
            .filter(|request| status.is_none_or(|wanted| request.status == wanted))
            .cloned()
            .collect();
        Ok(RequestPage {
            items,
            next_token: None,
        })
    }
}

#[async_trait]
impl StatusUpdater for InMemoryRequestStore {
    async fn update(&self, request_id: RequestId, patch: RequestPatch) -> AppResult<()> {
        RequestRepository::update(self, request_id, patch).await?;
        Ok(())
    }
}

#[async_trait]
impl RequestChangeFeed for InMemoryRequestStore {
    async fn poll(&self, limit: usize) -> AppResult<Vec<RequestChangeEvent>> {
        let mut inner = self.inner.lock().await;
        let mut batch = Vec::new();
        for event in inner
            .events
            .iter_mut()
            .filter(|event| !event.acked && !event.in_flight)
            .take(limit)
        {
            event.delivery_count += 1;
            event.in_flight = true;
            batch.push(RequestChangeEvent {
                event_id: event.id.to_string(),
                old: event.old.clone(),
                new: event.new.clone(),
                delivery_count: event.delivery_count,
            });
        }
        Ok(batch)
    }

    async fn ack(&self, event_id: &str) -> AppResult<()> {
        let id = parse_event_id(event_id)?;
        let mut inner = self.inner.lock().await;
        if let Some(event) = inner.events.iter_mut().find(|event| event.id == id) {
            event.acked = true;
            event.in_flight = false;
        }
        Ok(())
    }

    async fn release(&self, event_id: &str) -> AppResult<()> {
        let id = parse_event_id(event_id)?;
        let mut inner = self.inner.lock().await;
        if let Some(event) = inner.events.iter_mut().find(|event| event.id == id) {
            event.in_flight = false;
        }
        Ok(())
    }
}

fn parse_event_id(event_id: &str) -> AppResult<u64> {
    event_id.parse::<u64>().map_err(|error| {
        AppError::Validation(format!("invalid change event id '{event_id}': {error}"))
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use elevate_application::{RequestChangeFeed, RequestRepository};
    use elevate_domain::{AccessDuration, Request, RequestDraft, RequestPatch, RequestStatus};

    use super::InMemoryRequestStore;

    fn request() -> Request {
        let Ok(duration) = AccessDuration::from_hours(1) else {
            panic!("duration should validate");
        };
        let Ok(request) = Request::new(RequestDraft {
            email: "dev@example.com".to_owned(),
            username: "dev".to_owned(),
            user_id: "user-1".to_owned(),
            account_id: "111122223333".to_owned(),
            account_name: "Sandbox".to_owned(),
            role: "ReadOnlyAccess".to_owned(),
            role_id: "ps-1".to_owned(),
            start_time: Utc::now(),
            duration,
            approval_required: false,
            justification: None,
            ticket_no: None,
            approvers: Vec::new(),
            approver_ids: vec!["approver-1".to_owned()],
        }) else {
            panic!("draft should validate");
        };
        request
    }

    #[tokio::test]
    async fn mutations_flow_through_the_feed_in_order() {
        let store = InMemoryRequestStore::new();
        let request = request();
        assert!(store.create(request.clone()).await.is_ok());
        assert!(
            RequestRepository::update(
                &store,
                request.id,
                RequestPatch::with_status(RequestStatus::Approved),
            )
            .await
            .is_ok()
        );

        let batch = store.poll(10).await;
        let Ok(batch) = batch else {
            panic!("poll should succeed");
        };
        assert_eq!(batch.len(), 2);
        assert!(batch[0].old.is_none());
        assert_eq!(batch[0].new.status, RequestStatus::Pending);
        assert_eq!(
            batch[1].old.as_ref().map(|image| image.status),
            Some(RequestStatus::Pending)
        );
        assert_eq!(batch[1].new.status, RequestStatus::Approved);
    }

    #[tokio::test]
    async fn released_events_are_redelivered_with_a_higher_count() {
        let store = InMemoryRequestStore::new();
        assert!(store.create(request()).await.is_ok());

        let Ok(first) = store.poll(10).await else {
            panic!("poll should succeed");
        };
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].delivery_count, 1);

        // In flight: not redelivered until released.
        let Ok(empty) = store.poll(10).await else {
            panic!("poll should succeed");
        };
        assert!(empty.is_empty());

        assert!(store.release(first[0].event_id.as_str()).await.is_ok());
        let Ok(second) = store.poll(10).await else {
            panic!("poll should succeed");
        };
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].delivery_count, 2);

        assert!(store.ack(second[0].event_id.as_str()).await.is_ok());
        let Ok(done) = store.poll(10).await else {
            panic!("poll should succeed");
        };
        assert!(done.is_empty());
    }

    #[tokio::test]
    async fn approver_query_matches_candidate_ids() {
        let store = InMemoryRequestStore::new();
        let request = request();
        assert!(store.create(request.clone()).await.is_ok());

        let Ok(page) = store
            .query_by_approver_and_status("approver-1", None, None)
            .await
        else {
            panic!("query should succeed");
        };
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, request.id);

        let Ok(empty) = store
            .query_by_approver_and_status("approver-2", None, None)
            .await
        else {
            panic!("query should succeed");
        };
        assert!(empty.items.is_empty());
    }
}
