use chrono::{DateTime, Utc};
use elevate_core::RequestId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::request::Request;

/// Audit record of one completed (or in-flight) elevated-access window.
///
/// Immutable once `end_time` is set; `expire_at` drives automatic expiry
/// from hot storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Stable session identifier.
    pub id: String,
    /// Request this session belongs to.
    pub request_id: RequestId,
    /// Principal that held the access.
    pub username: String,
    /// Account the access was granted on.
    pub account_id: String,
    /// Permission-set display name.
    pub role: String,
    /// Approver principal ids frozen from the request.
    pub approver_ids: Vec<String>,
    /// Start of the access window.
    pub start_time: DateTime<Utc>,
    /// End of the access window, once revoked.
    pub end_time: Option<DateTime<Utc>>,
    /// Correlation id for activity-log queries.
    pub query_id: Option<String>,
    /// Hot-storage time-to-live deadline.
    pub expire_at: DateTime<Utc>,
}

impl Session {
    /// Opens a session at grant time for the given request.
    #[must_use]
    pub fn open(request: &Request, start_time: DateTime<Utc>, ttl: chrono::Duration) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request_id: request.id,
            username: request.username.clone(),
            account_id: request.account_id.clone(),
            role: request.role.clone(),
            approver_ids: request.approver_ids.clone(),
            start_time,
            end_time: None,
            query_id: None,
            expire_at: start_time + ttl,
        }
    }
}
