use elevate_core::AppResult;
use elevate_domain::{Request, RequestStatus};
use serde::{Deserialize, Serialize};

use crate::lifecycle_ports::NotificationKind;

use super::{Effect, EffectOutcome, unexpected_outcome};

/// Pure notification fan-out for a declined or withdrawn request.
///
/// The branch is keyed at entry on the terminal status: `cancelled` means
/// the requester withdrew, anything else means an approver declined. The
/// machine always reaches `Done`, even when the notification fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RejectState {
    /// Tell the requester the request was withdrawn.
    NotifyCancelled,
    /// Tell the requester the request was declined.
    NotifyRejected,
    /// Terminal.
    Done,
}

impl RejectState {
    /// Returns the entry state for the request's terminal status.
    #[must_use]
    pub fn initial(request: &Request) -> Self {
        if request.status == RequestStatus::Cancelled {
            Self::NotifyCancelled
        } else {
            Self::NotifyRejected
        }
    }

    /// Returns the effect this state asks for, or `None` when terminal.
    #[must_use]
    pub fn effect(&self) -> Option<Effect> {
        match self {
            Self::NotifyCancelled => Some(Effect::Notify(NotificationKind::Cancelled)),
            Self::NotifyRejected => Some(Effect::Notify(NotificationKind::Rejected)),
            Self::Done => None,
        }
    }

    /// Applies one effect outcome and returns the next state.
    pub fn advance(self, outcome: &EffectOutcome) -> AppResult<Self> {
        match (self, outcome) {
            (Self::NotifyCancelled | Self::NotifyRejected, EffectOutcome::Succeeded) => {
                Ok(Self::Done)
            }
            (state, outcome) => Err(unexpected_outcome("reject", state.name(), outcome)),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::NotifyCancelled => "notify_cancelled",
            Self::NotifyRejected => "notify_rejected",
            Self::Done => "done",
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use elevate_domain::{AccessDuration, Request, RequestDraft, RequestStatus};

    use crate::lifecycle_ports::NotificationKind;
    use crate::machines::{Effect, EffectOutcome};

    use super::RejectState;

    fn request_with_status(status: RequestStatus) -> Request {
        let Ok(duration) = AccessDuration::from_hours(1) else {
            panic!("duration should validate");
        };
        let Ok(mut request) = Request::new(RequestDraft {
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
            approver_ids: Vec::new(),
        }) else {
            panic!("draft should validate");
        };
        request.status = status;
        request
    }

    #[test]
    fn cancelled_request_notifies_cancellation() {
        let state = RejectState::initial(&request_with_status(RequestStatus::Cancelled));
        assert_eq!(
            state.effect(),
            Some(Effect::Notify(NotificationKind::Cancelled))
        );
    }

    #[test]
    fn rejected_request_notifies_rejection_and_finishes() {
        let state = RejectState::initial(&request_with_status(RequestStatus::Rejected));
        assert_eq!(
            state.effect(),
            Some(Effect::Notify(NotificationKind::Rejected))
        );

        let next = state.advance(&EffectOutcome::Succeeded);
        assert_eq!(next.ok(), Some(RejectState::Done));
    }
}
