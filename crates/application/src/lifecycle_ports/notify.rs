use async_trait::async_trait;
use elevate_core::AppResult;
use elevate_domain::Request;

/// Lifecycle moment a notification announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// A request is waiting for the candidate approvers.
    ApprovalPending,
    /// A request was scheduled for a future start.
    Scheduled,
    /// Access is now active.
    AccessStarted,
    /// The grant failed permanently.
    AccessError,
    /// The access window ended.
    SessionEnded,
    /// The approval window elapsed with no decision.
    Expired,
    /// An approver declined the request.
    Rejected,
    /// The requester withdrew the request.
    Cancelled,
}

impl NotificationKind {
    /// Returns the stable template key for this notification.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApprovalPending => "approval_pending",
            Self::Scheduled => "scheduled",
            Self::AccessStarted => "access_started",
            Self::AccessError => "access_error",
            Self::SessionEnded => "session_ended",
            Self::Expired => "expired",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One notification with the request payload the template renders from.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEvent {
    /// Which lifecycle moment happened.
    pub kind: NotificationKind,
    /// Request image at the time of the event.
    pub request: Request,
}

impl NotificationEvent {
    /// Returns who should receive this notification.
    ///
    /// Approval-pending events fan out to the candidate approvers; every
    /// other event goes to the requester.
    #[must_use]
    pub fn recipients(&self) -> Vec<String> {
        match self.kind {
            NotificationKind::ApprovalPending => self.request.approver_ids.clone(),
            _ => vec![self.request.email.clone()],
        }
    }
}

/// Best-effort notification port.
///
/// Callers absorb failures: a broken notification channel must never block
/// a grant or revoke action.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one notification.
    async fn notify(&self, event: NotificationEvent) -> AppResult<()>;
}
