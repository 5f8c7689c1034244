use elevate_core::AppResult;
use elevate_domain::RequestStatus;
use serde::{Deserialize, Serialize};

use crate::lifecycle_ports::NotificationKind;

use super::{Effect, EffectOutcome, unexpected_outcome};

/// Removes access and closes the record.
///
/// The opening status read is the primary defense against double-revoke:
/// overlapping triggers (scheduled expiry racing a manual revoke, event
/// redelivery) all funnel through it, and a request that is already
/// `revoked` short-circuits to a terminal no-op without touching the
/// access provider or the recorded end time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RevokeState {
    /// Read the currently persisted status.
    ReadCurrentStatus,
    /// Delete the permission assignment.
    RevokePermission,
    /// Tell the requester the window ended, regardless of revoke outcome.
    NotifySessionEnded {
        /// Captured revoke failure, if any.
        revoke_error: Option<String>,
    },
    /// Persist revoked, or error when the revoke failed.
    UpdateStatus {
        /// Captured revoke failure, if any.
        revoke_error: Option<String>,
    },
    /// Tell the requester the revoke failed.
    NotifyError,
    /// Persist the actual end-of-window timestamp.
    RecordEndTime,
    /// Terminal.
    Done,
}

impl RevokeState {
    /// Returns the entry state.
    #[must_use]
    pub fn initial() -> Self {
        Self::ReadCurrentStatus
    }

    /// Returns the effect this state asks for, or `None` when terminal.
    #[must_use]
    pub fn effect(&self) -> Option<Effect> {
        match self {
            Self::ReadCurrentStatus => Some(Effect::ReadStatus),
            Self::RevokePermission => Some(Effect::RevokeAccess),
            Self::NotifySessionEnded { .. } => {
                Some(Effect::Notify(NotificationKind::SessionEnded))
            }
            Self::UpdateStatus { revoke_error } => Some(Effect::UpdateStatus(
                if revoke_error.is_some() {
                    RequestStatus::Error
                } else {
                    RequestStatus::Revoked
                },
            )),
            Self::NotifyError => Some(Effect::Notify(NotificationKind::AccessError)),
            Self::RecordEndTime => Some(Effect::RecordEndTime),
            Self::Done => None,
        }
    }

    /// Applies one effect outcome and returns the next state.
    pub fn advance(self, outcome: &EffectOutcome) -> AppResult<Self> {
        match (self, outcome) {
            (Self::ReadCurrentStatus, EffectOutcome::StatusRead(RequestStatus::Revoked)) => {
                Ok(Self::Done)
            }
            (Self::ReadCurrentStatus, EffectOutcome::StatusRead(_)) => {
                Ok(Self::RevokePermission)
            }
            (Self::RevokePermission, EffectOutcome::Succeeded) => {
                Ok(Self::NotifySessionEnded { revoke_error: None })
            }
            (Self::RevokePermission, EffectOutcome::Failed(message)) => {
                Ok(Self::NotifySessionEnded {
                    revoke_error: Some(message.clone()),
                })
            }
            (Self::NotifySessionEnded { revoke_error }, EffectOutcome::Succeeded) => {
                Ok(Self::UpdateStatus { revoke_error })
            }
            (
                Self::UpdateStatus {
                    revoke_error: Some(_),
                },
                EffectOutcome::Succeeded,
            ) => Ok(Self::NotifyError),
            (Self::UpdateStatus { revoke_error: None }, EffectOutcome::Succeeded) => {
                Ok(Self::RecordEndTime)
            }
            (Self::NotifyError, EffectOutcome::Succeeded) => Ok(Self::Done),
            (Self::RecordEndTime, EffectOutcome::Succeeded) => Ok(Self::Done),
            (state, outcome) => Err(unexpected_outcome("revoke", state.name(), outcome)),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::ReadCurrentStatus => "read_current_status",
            Self::RevokePermission => "revoke_permission",
            Self::NotifySessionEnded { .. } => "notify_session_ended",
            Self::UpdateStatus { .. } => "update_status",
            Self::NotifyError => "notify_error",
            Self::RecordEndTime => "record_end_time",
            Self::Done => "done",
        }
    }
}

#[cfg(test)]
mod tests {
    use elevate_domain::RequestStatus;

    use crate::machines::{Effect, EffectOutcome};

    use super::RevokeState;

    fn step(state: RevokeState, outcome: EffectOutcome) -> RevokeState {
        match state.advance(&outcome) {
            Ok(next) => next,
            Err(error) => panic!("unexpected transition error: {error}"),
        }
    }

    #[test]
    fn already_revoked_short_circuits() {
        let state = step(
            RevokeState::initial(),
            EffectOutcome::StatusRead(RequestStatus::Revoked),
        );
        assert_eq!(state, RevokeState::Done);
        assert_eq!(state.effect(), None);
    }

    #[test]
    fn happy_path_records_end_time() {
        let mut state = RevokeState::initial();
        state = step(state, EffectOutcome::StatusRead(RequestStatus::InProgress));
        assert_eq!(state.effect(), Some(Effect::RevokeAccess));

        state = step(state, EffectOutcome::Succeeded);
        state = step(state, EffectOutcome::Succeeded);
        assert_eq!(
            state.effect(),
            Some(Effect::UpdateStatus(RequestStatus::Revoked))
        );

        state = step(state, EffectOutcome::Succeeded);
        assert_eq!(state.effect(), Some(Effect::RecordEndTime));

        state = step(state, EffectOutcome::Succeeded);
        assert_eq!(state, RevokeState::Done);
    }

    #[test]
    fn captured_revoke_error_notifies_without_end_time() {
        let mut state = RevokeState::initial();
        state = step(state, EffectOutcome::StatusRead(RequestStatus::InProgress));
        state = step(state, EffectOutcome::Failed("provider down".to_owned()));
        state = step(state, EffectOutcome::Succeeded);
        assert_eq!(
            state.effect(),
            Some(Effect::UpdateStatus(RequestStatus::Error))
        );

        state = step(state, EffectOutcome::Succeeded);
        assert_eq!(state, RevokeState::NotifyError);

        state = step(state, EffectOutcome::Succeeded);
        assert_eq!(state, RevokeState::Done);
    }
}
