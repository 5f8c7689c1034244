use elevate_core::AppResult;
use elevate_domain::RequestStatus;
use serde::{Deserialize, Serialize};

use crate::lifecycle_ports::NotificationKind;

use super::{Effect, EffectOutcome, unexpected_outcome};

/// Watches a pending request for approval expiry.
///
/// The approval decision itself happens outside this machine, through the
/// record mutation path; this machine only notifies the candidate
/// approvers once and expires the request if nobody acted before the
/// window (read from settings at suspension time) elapsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ApprovalState {
    /// Fan one notification out to the candidate approvers.
    NotifyApprovers,
    /// Suspend for the configured approval expiry window.
    WaitForDecision,
    /// Re-read the persisted status after the wait.
    ReadCurrentStatus,
    /// Persist the expired status.
    UpdateStatusExpired,
    /// Tell the requester the request expired.
    NotifyExpired,
    /// Terminal.
    Done,
}

impl ApprovalState {
    /// Returns the entry state.
    #[must_use]
    pub fn initial() -> Self {
        Self::NotifyApprovers
    }

    /// Returns the effect this state asks for, or `None` when terminal.
    #[must_use]
    pub fn effect(&self) -> Option<Effect> {
        match self {
            Self::NotifyApprovers => Some(Effect::Notify(NotificationKind::ApprovalPending)),
            Self::WaitForDecision => Some(Effect::WaitForApprovalExpiry),
            Self::ReadCurrentStatus => Some(Effect::ReadStatus),
            Self::UpdateStatusExpired => Some(Effect::UpdateStatus(RequestStatus::Expired)),
            Self::NotifyExpired => Some(Effect::Notify(NotificationKind::Expired)),
            Self::Done => None,
        }
    }

    /// Applies one effect outcome and returns the next state.
    pub fn advance(self, outcome: &EffectOutcome) -> AppResult<Self> {
        match (self, outcome) {
            (Self::NotifyApprovers, EffectOutcome::Succeeded) => Ok(Self::WaitForDecision),
            (Self::WaitForDecision, EffectOutcome::TimerFired) => Ok(Self::ReadCurrentStatus),
            (Self::ReadCurrentStatus, EffectOutcome::StatusRead(RequestStatus::Pending)) => {
                Ok(Self::UpdateStatusExpired)
            }
            (Self::ReadCurrentStatus, EffectOutcome::StatusRead(_)) => Ok(Self::Done),
            (Self::UpdateStatusExpired, EffectOutcome::Succeeded) => Ok(Self::NotifyExpired),
            (Self::NotifyExpired, EffectOutcome::Succeeded) => Ok(Self::Done),
            (state, outcome) => Err(unexpected_outcome("approval", state.name(), outcome)),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::NotifyApprovers => "notify_approvers",
            Self::WaitForDecision => "wait_for_decision",
            Self::ReadCurrentStatus => "read_current_status",
            Self::UpdateStatusExpired => "update_status_expired",
            Self::NotifyExpired => "notify_expired",
            Self::Done => "done",
        }
    }
}

#[cfg(test)]
mod tests {
    use elevate_domain::RequestStatus;

    use crate::machines::{Effect, EffectOutcome};

    use super::ApprovalState;

    fn step(state: ApprovalState, outcome: EffectOutcome) -> ApprovalState {
        match state.advance(&outcome) {
            Ok(next) => next,
            Err(error) => panic!("unexpected transition error: {error}"),
        }
    }

    #[test]
    fn untouched_request_expires_and_notifies_once() {
        let mut state = ApprovalState::initial();
        state = step(state, EffectOutcome::Succeeded);
        assert_eq!(state.effect(), Some(Effect::WaitForApprovalExpiry));

        state = step(state, EffectOutcome::TimerFired);
        state = step(state, EffectOutcome::StatusRead(RequestStatus::Pending));
        assert_eq!(
            state.effect(),
            Some(Effect::UpdateStatus(RequestStatus::Expired))
        );

        state = step(state, EffectOutcome::Succeeded);
        assert_eq!(state, ApprovalState::NotifyExpired);

        state = step(state, EffectOutcome::Succeeded);
        assert_eq!(state, ApprovalState::Done);
    }

    #[test]
    fn decided_request_takes_the_no_op_branch() {
        for decided in [
            RequestStatus::Approved,
            RequestStatus::Rejected,
            RequestStatus::InProgress,
        ] {
            let state = step(
                ApprovalState::ReadCurrentStatus,
                EffectOutcome::StatusRead(decided),
            );
            assert_eq!(state, ApprovalState::Done);
        }
    }
}
