use elevate_core::AppResult;
use elevate_domain::RequestStatus;
use serde::{Deserialize, Serialize};

use crate::lifecycle_ports::{NotificationKind, WorkflowKind};

use super::{Effect, EffectOutcome, unexpected_outcome};

/// Holds a request until its future start time, then hands off to the
/// grant machine.
///
/// Cancellation is cooperative: the machine re-reads the status after the
/// wait and only grants when the request is still `scheduled`, so a
/// requester cancelling mid-wait causes a terminal no-op rather than
/// killing the execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ScheduleState {
    /// Persist the scheduled status.
    UpdateStatusScheduled,
    /// Tell the requester the window was scheduled.
    NotifyScheduled,
    /// Suspend until the request's absolute start time.
    WaitForStartTime,
    /// Re-read the persisted status after the wait.
    ReadCurrentStatus,
    /// Start the grant machine for the same request.
    StartGrant,
    /// Terminal.
    Done,
}

impl ScheduleState {
    /// Returns the entry state.
    #[must_use]
    pub fn initial() -> Self {
        Self::UpdateStatusScheduled
    }

    /// Returns the effect this state asks for, or `None` when terminal.
    #[must_use]
    pub fn effect(&self) -> Option<Effect> {
        match self {
            Self::UpdateStatusScheduled => {
                Some(Effect::UpdateStatus(RequestStatus::Scheduled))
            }
            Self::NotifyScheduled => Some(Effect::Notify(NotificationKind::Scheduled)),
            Self::WaitForStartTime => Some(Effect::WaitUntilStartTime),
            Self::ReadCurrentStatus => Some(Effect::ReadStatus),
            Self::StartGrant => Some(Effect::StartWorkflow(WorkflowKind::Grant)),
            Self::Done => None,
        }
    }

    /// Applies one effect outcome and returns the next state.
    pub fn advance(self, outcome: &EffectOutcome) -> AppResult<Self> {
        match (self, outcome) {
            (Self::UpdateStatusScheduled, EffectOutcome::Succeeded) => Ok(Self::NotifyScheduled),
            (Self::NotifyScheduled, EffectOutcome::Succeeded) => Ok(Self::WaitForStartTime),
            (Self::WaitForStartTime, EffectOutcome::TimerFired) => Ok(Self::ReadCurrentStatus),
            (Self::ReadCurrentStatus, EffectOutcome::StatusRead(RequestStatus::Scheduled)) => {
                Ok(Self::StartGrant)
            }
            (Self::ReadCurrentStatus, EffectOutcome::StatusRead(_)) => Ok(Self::Done),
            (Self::StartGrant, EffectOutcome::Succeeded) => Ok(Self::Done),
            (state, outcome) => Err(unexpected_outcome("schedule", state.name(), outcome)),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::UpdateStatusScheduled => "update_status_scheduled",
            Self::NotifyScheduled => "notify_scheduled",
            Self::WaitForStartTime => "wait_for_start_time",
            Self::ReadCurrentStatus => "read_current_status",
            Self::StartGrant => "start_grant",
            Self::Done => "done",
        }
    }
}

#[cfg(test)]
mod tests {
    use elevate_domain::RequestStatus;

    use crate::lifecycle_ports::WorkflowKind;
    use crate::machines::{Effect, EffectOutcome};

    use super::ScheduleState;

    fn step(state: ScheduleState, outcome: EffectOutcome) -> ScheduleState {
        match state.advance(&outcome) {
            Ok(next) => next,
            Err(error) => panic!("unexpected transition error: {error}"),
        }
    }

    #[test]
    fn still_scheduled_after_wait_starts_grant() {
        let mut state = ScheduleState::initial();
        state = step(state, EffectOutcome::Succeeded);
        state = step(state, EffectOutcome::Succeeded);
        assert_eq!(state.effect(), Some(Effect::WaitUntilStartTime));

        state = step(state, EffectOutcome::TimerFired);
        state = step(state, EffectOutcome::StatusRead(RequestStatus::Scheduled));
        assert_eq!(
            state.effect(),
            Some(Effect::StartWorkflow(WorkflowKind::Grant))
        );

        state = step(state, EffectOutcome::Succeeded);
        assert_eq!(state, ScheduleState::Done);
    }

    #[test]
    fn cancelled_during_wait_is_a_no_op() {
        let mut state = ScheduleState::ReadCurrentStatus;
        state = step(state, EffectOutcome::StatusRead(RequestStatus::Cancelled));
        assert_eq!(state, ScheduleState::Done);
        assert_eq!(state.effect(), None);
    }
}
