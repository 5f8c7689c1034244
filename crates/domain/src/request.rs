use chrono::{DateTime, Utc};
use elevate_core::{AppError, AppResult, RequestId};
use serde::{Deserialize, Serialize};

use crate::duration::AccessDuration;

/// Lifecycle status of one elevated-access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Submitted and waiting for an approval decision.
    Pending,
    /// Approved by an approver (or auto-approved) but not yet granted.
    Approved,
    /// Waiting for a future start time.
    Scheduled,
    /// Access is currently granted.
    InProgress,
    /// Declined by an approver.
    Rejected,
    /// Withdrawn by the requester.
    Cancelled,
    /// Approval window elapsed with no decision.
    Expired,
    /// Access window ended and the assignment was removed.
    Revoked,
    /// Grant or revoke failed permanently.
    Error,
}

impl RequestStatus {
    /// Returns the stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
            Self::Error => "error",
        }
    }

    /// Parses the stable storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "scheduled" => Ok(Self::Scheduled),
            "in_progress" => Ok(Self::InProgress),
            "rejected" => Ok(Self::Rejected),
            "cancelled" => Ok(Self::Cancelled),
            "expired" => Ok(Self::Expired),
            "revoked" => Ok(Self::Revoked),
            "error" => Ok(Self::Error),
            _ => Err(AppError::Validation(format!(
                "unknown request status '{value}'"
            ))),
        }
    }

    /// Returns true when no further transition may leave this status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Cancelled | Self::Expired | Self::Revoked | Self::Error
        )
    }

    /// Returns true when the lifecycle may move from this status to `next`.
    ///
    /// Transitions are monotonic: a terminal status has no successors and a
    /// request never moves backward along the lifecycle.
    #[must_use]
    pub fn may_transition_to(&self, next: Self) -> bool {
        if *self == next {
            return false;
        }

        match self {
            Self::Pending => matches!(
                next,
                Self::Approved
                    | Self::Scheduled
                    | Self::InProgress
                    | Self::Rejected
                    | Self::Cancelled
                    | Self::Expired
                    | Self::Error
            ),
            Self::Approved => matches!(
                next,
                Self::Scheduled | Self::InProgress | Self::Cancelled | Self::Error
            ),
            Self::Scheduled => matches!(next, Self::InProgress | Self::Cancelled | Self::Error),
            Self::InProgress => matches!(next, Self::Revoked | Self::Error),
            Self::Rejected | Self::Cancelled | Self::Expired | Self::Revoked | Self::Error => false,
        }
    }
}

/// One elevated-access request record.
///
/// Field names are the contract surface shared with the record store and
/// the notification templates; `approver_ids` and `session_duration` keep
/// their historical snake_case wire names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Stable request identifier.
    pub id: RequestId,
    /// Requester email address.
    pub email: String,
    /// Requester display username.
    pub username: String,
    /// Requester identifier in the identity store.
    pub user_id: String,
    /// Target account identifier.
    pub account_id: String,
    /// Target account display name.
    pub account_name: String,
    /// Requested permission-set display name.
    pub role: String,
    /// Requested permission-set identifier.
    pub role_id: String,
    /// Requested or scheduled start of the access window.
    pub start_time: DateTime<Utc>,
    /// Requested window length.
    pub duration: AccessDuration,
    /// Actual end of the access window; set when the request is revoked.
    pub end_time: Option<DateTime<Utc>>,
    /// Current lifecycle status.
    pub status: RequestStatus,
    /// Whether an approver must act before access is granted.
    ///
    /// Evaluated once at submission time from eligibility policy and
    /// settings, then frozen on the record.
    pub approval_required: bool,
    /// Requester-supplied reason for elevation.
    pub justification: Option<String>,
    /// Approver or operator comment.
    pub comment: Option<String>,
    /// Change/incident ticket reference.
    pub ticket_no: Option<String>,
    /// Display name of the approver who decided.
    pub approver: Option<String>,
    /// Identity-store id of the approver who decided.
    pub approver_id: Option<String>,
    /// Ordered display names of candidate approvers.
    pub approvers: Vec<String>,
    /// Candidate approver principal ids, frozen at submission time.
    #[serde(rename = "approver_ids")]
    pub approver_ids: Vec<String>,
    /// Display name of whoever revoked the access.
    pub revoker: Option<String>,
    /// Identity-store id of whoever revoked the access.
    pub revoker_id: Option<String>,
    /// Reason supplied with a manual revoke.
    pub revoke_comment: Option<String>,
    /// Rendered length of the granted window.
    #[serde(rename = "session_duration")]
    pub session_duration: Option<String>,
}

/// Input payload used to construct a validated request record.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDraft {
    /// Requester email address.
    pub email: String,
    /// Requester display username.
    pub username: String,
    /// Requester identifier in the identity store.
    pub user_id: String,
    /// Target account identifier.
    pub account_id: String,
    /// Target account display name.
    pub account_name: String,
    /// Requested permission-set display name.
    pub role: String,
    /// Requested permission-set identifier.
    pub role_id: String,
    /// Requested start of the access window.
    pub start_time: DateTime<Utc>,
    /// Requested window length.
    pub duration: AccessDuration,
    /// Whether an approver must act before access is granted.
    pub approval_required: bool,
    /// Requester-supplied reason for elevation.
    pub justification: Option<String>,
    /// Change/incident ticket reference.
    pub ticket_no: Option<String>,
    /// Ordered display names of candidate approvers.
    pub approvers: Vec<String>,
    /// Candidate approver principal ids gathered at submission time.
    pub approver_ids: Vec<String>,
}

impl Request {
    /// Creates a validated pending request from a submission draft.
    pub fn new(draft: RequestDraft) -> AppResult<Self> {
        require_non_empty("email", draft.email.as_str())?;
        require_non_empty("username", draft.username.as_str())?;
        require_non_empty("user_id", draft.user_id.as_str())?;
        require_non_empty("account_id", draft.account_id.as_str())?;
        require_non_empty("account_name", draft.account_name.as_str())?;
        require_non_empty("role", draft.role.as_str())?;
        require_non_empty("role_id", draft.role_id.as_str())?;

        if draft.approval_required && draft.approver_ids.is_empty() {
            return Err(AppError::Validation(
                "a request that requires approval must carry candidate approver ids".to_owned(),
            ));
        }

        Ok(Self {
            id: RequestId::new(),
            email: draft.email,
            username: draft.username,
            user_id: draft.user_id,
            account_id: draft.account_id,
            account_name: draft.account_name,
            role: draft.role,
            role_id: draft.role_id,
            start_time: draft.start_time,
            duration: draft.duration,
            end_time: None,
            status: RequestStatus::Pending,
            approval_required: draft.approval_required,
            justification: draft.justification,
            comment: None,
            ticket_no: draft.ticket_no,
            approver: None,
            approver_id: None,
            approvers: draft.approvers,
            approver_ids: draft.approver_ids,
            revoker: None,
            revoker_id: None,
            revoke_comment: None,
            session_duration: None,
        })
    }
}

/// Partial last-write-wins update of one request record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestPatch {
    /// New lifecycle status.
    pub status: Option<RequestStatus>,
    /// Actual grant timestamp.
    pub start_time: Option<DateTime<Utc>>,
    /// Actual end-of-window timestamp.
    pub end_time: Option<DateTime<Utc>>,
    /// Rendered length of the granted window.
    pub session_duration: Option<String>,
    /// Approver display name.
    pub approver: Option<String>,
    /// Approver identity-store id.
    pub approver_id: Option<String>,
    /// Revoker display name.
    pub revoker: Option<String>,
    /// Revoker identity-store id.
    pub revoker_id: Option<String>,
    /// Reason supplied with a manual revoke.
    pub revoke_comment: Option<String>,
    /// Approver or operator comment.
    pub comment: Option<String>,
}

impl RequestPatch {
    /// Creates a patch that only moves the lifecycle status.
    #[must_use]
    pub fn with_status(status: RequestStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Returns true when the patch carries no field at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies the patch to a record, rejecting backward status moves.
    pub fn apply(&self, request: &mut Request) -> AppResult<()> {
        if let Some(next) = self.status
            && next != request.status
        {
            if !request.status.may_transition_to(next) {
                return Err(AppError::Conflict(format!(
                    "request '{}' cannot move from '{}' to '{}'",
                    request.id,
                    request.status.as_str(),
                    next.as_str()
                )));
            }
            request.status = next;
        }

        if let Some(start_time) = self.start_time {
            request.start_time = start_time;
        }
        if let Some(end_time) = self.end_time {
            request.end_time = Some(end_time);
        }
        if let Some(session_duration) = &self.session_duration {
            request.session_duration = Some(session_duration.clone());
        }
        if let Some(approver) = &self.approver {
            request.approver = Some(approver.clone());
        }
        if let Some(approver_id) = &self.approver_id {
            request.approver_id = Some(approver_id.clone());
        }
        if let Some(revoker) = &self.revoker {
            request.revoker = Some(revoker.clone());
        }
        if let Some(revoker_id) = &self.revoker_id {
            request.revoker_id = Some(revoker_id.clone());
        }
        if let Some(revoke_comment) = &self.revoke_comment {
            request.revoke_comment = Some(revoke_comment.clone());
        }
        if let Some(comment) = &self.comment {
            request.comment = Some(comment.clone());
        }

        Ok(())
    }
}

fn require_non_empty(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!(
            "request field '{field}' must not be empty"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use proptest::prelude::*;

    use crate::AccessDuration;

    use super::{Request, RequestDraft, RequestPatch, RequestStatus};

    fn hour() -> AccessDuration {
        match AccessDuration::from_hours(1) {
            Ok(duration) => duration,
            Err(error) => panic!("duration should validate: {error}"),
        }
    }

    fn draft() -> RequestDraft {
        RequestDraft {
            email: "dev@example.com".to_owned(),
            username: "dev".to_owned(),
            user_id: "user-1".to_owned(),
            account_id: "111122223333".to_owned(),
            account_name: "Sandbox".to_owned(),
            role: "AdministratorAccess".to_owned(),
            role_id: "ps-1".to_owned(),
            start_time: Utc::now(),
            duration: hour(),
            approval_required: false,
            justification: Some("incident follow-up".to_owned()),
            ticket_no: None,
            approvers: Vec::new(),
            approver_ids: Vec::new(),
        }
    }

    const ALL_STATUSES: [RequestStatus; 9] = [
        RequestStatus::Pending,
        RequestStatus::Approved,
        RequestStatus::Scheduled,
        RequestStatus::InProgress,
        RequestStatus::Rejected,
        RequestStatus::Cancelled,
        RequestStatus::Expired,
        RequestStatus::Revoked,
        RequestStatus::Error,
    ];

    #[test]
    fn new_request_starts_pending() {
        let request = Request::new(draft());
        assert_eq!(request.map(|r| r.status).ok(), Some(RequestStatus::Pending));
    }

    #[test]
    fn approval_required_needs_candidate_approvers() {
        let mut input = draft();
        input.approval_required = true;
        assert!(Request::new(input).is_err());
    }

    #[test]
    fn wire_field_names_follow_the_record_contract() {
        let Ok(request) = Request::new(draft()) else {
            panic!("draft should validate");
        };
        let Ok(value) = serde_json::to_value(&request) else {
            panic!("request should serialize");
        };

        let Some(object) = value.as_object() else {
            panic!("request should serialize to an object");
        };
        assert!(object.contains_key("accountId"));
        assert!(object.contains_key("roleId"));
        assert!(object.contains_key("startTime"));
        assert!(object.contains_key("approver_ids"));
        assert!(object.contains_key("session_duration"));
        assert_eq!(object.get("status"), Some(&serde_json::json!("pending")));
    }

    #[test]
    fn status_values_round_trip() {
        for status in ALL_STATUSES {
            assert_eq!(RequestStatus::parse(status.as_str()).ok(), Some(status));
        }
    }

    #[test]
    fn patch_rejects_backward_status_move() {
        let Ok(mut request) = Request::new(draft()) else {
            panic!("draft should validate");
        };
        request.status = RequestStatus::Revoked;

        let result = RequestPatch::with_status(RequestStatus::InProgress).apply(&mut request);
        assert!(result.is_err());
        assert_eq!(request.status, RequestStatus::Revoked);
    }

    #[test]
    fn patch_applies_end_time() {
        let Ok(mut request) = Request::new(draft()) else {
            panic!("draft should validate");
        };
        request.status = RequestStatus::InProgress;

        let now = Utc::now();
        let patch = RequestPatch {
            status: Some(RequestStatus::Revoked),
            end_time: Some(now),
            ..RequestPatch::default()
        };
        assert!(patch.apply(&mut request).is_ok());
        assert_eq!(request.status, RequestStatus::Revoked);
        assert_eq!(request.end_time, Some(now));
    }

    proptest! {
        #[test]
        fn terminal_statuses_have_no_successors(a in 0_usize..9, b in 0_usize..9) {
            let from = ALL_STATUSES[a];
            let to = ALL_STATUSES[b];
            if from.is_terminal() {
                prop_assert!(!from.may_transition_to(to));
            }
        }

        #[test]
        fn transitions_never_loop_back(a in 0_usize..9, b in 0_usize..9) {
            let from = ALL_STATUSES[a];
            let to = ALL_STATUSES[b];
            if from.may_transition_to(to) {
                prop_assert!(!to.may_transition_to(from));
            }
        }
    }
}
