use elevate_core::AppResult;
use elevate_domain::RequestStatus;
use serde::{Deserialize, Serialize};

use crate::lifecycle_ports::{NotificationKind, WorkflowKind};

use super::{Effect, EffectOutcome, unexpected_outcome};

/// Grants access, waits out the window, then hands off to the revoke
/// machine.
///
/// A grant failure after retries is captured into the state and routed to
/// the error branch; it never aborts the machine, so the record always gets
/// a status write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GrantState {
    /// Create the permission assignment.
    GrantPermission,
    /// Persist in-progress, or error when the grant failed.
    UpdateStatus {
        /// Captured grant failure, if any.
        grant_error: Option<String>,
    },
    /// Persist the actual grant timestamp.
    RecordStartTime {
        /// Captured grant failure, if any.
        grant_error: Option<String>,
    },
    /// Tell the requester the grant failed.
    NotifyError,
    /// Tell the requester access is active.
    NotifyStarted,
    /// Suspend for the requested window length.
    WaitForWindow,
    /// Start the revoke machine for the same request.
    StartRevoke,
    /// Terminal.
    Done,
}

impl GrantState {
    /// Returns the entry state.
    #[must_use]
    pub fn initial() -> Self {
        Self::GrantPermission
    }

    /// Returns the effect this state asks for, or `None` when terminal.
    #[must_use]
    pub fn effect(&self) -> Option<Effect> {
        match self {
            Self::GrantPermission => Some(Effect::GrantAccess),
            Self::UpdateStatus { grant_error } => Some(Effect::UpdateStatus(
                if grant_error.is_some() {
                    RequestStatus::Error
                } else {
                    RequestStatus::InProgress
                },
            )),
            Self::RecordStartTime { grant_error } => Some(Effect::RecordStartTime {
                open_session: grant_error.is_none(),
            }),
            Self::NotifyError => Some(Effect::Notify(NotificationKind::AccessError)),
            Self::NotifyStarted => Some(Effect::Notify(NotificationKind::AccessStarted)),
            Self::WaitForWindow => Some(Effect::WaitForDuration),
            Self::StartRevoke => Some(Effect::StartWorkflow(WorkflowKind::Revoke)),
            Self::Done => None,
        }
    }

    /// Applies one effect outcome and returns the next state.
    pub fn advance(self, outcome: &EffectOutcome) -> AppResult<Self> {
        match (self, outcome) {
            (Self::GrantPermission, EffectOutcome::Succeeded) => {
                Ok(Self::UpdateStatus { grant_error: None })
            }
            (Self::GrantPermission, EffectOutcome::Failed(message)) => Ok(Self::UpdateStatus {
                grant_error: Some(message.clone()),
            }),
            (Self::UpdateStatus { grant_error }, EffectOutcome::Succeeded) => {
                Ok(Self::RecordStartTime { grant_error })
            }
            (Self::RecordStartTime { grant_error }, EffectOutcome::Succeeded) => {
                Ok(match grant_error {
                    Some(_) => Self::NotifyError,
                    None => Self::NotifyStarted,
                })
            }
            (Self::NotifyError, EffectOutcome::Succeeded) => Ok(Self::Done),
            (Self::NotifyStarted, EffectOutcome::Succeeded) => Ok(Self::WaitForWindow),
            (Self::WaitForWindow, EffectOutcome::TimerFired) => Ok(Self::StartRevoke),
            (Self::StartRevoke, EffectOutcome::Succeeded) => Ok(Self::Done),
            (state, outcome) => Err(unexpected_outcome("grant", state.name(), outcome)),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::GrantPermission => "grant_permission",
            Self::UpdateStatus { .. } => "update_status",
            Self::RecordStartTime { .. } => "record_start_time",
            Self::NotifyError => "notify_error",
            Self::NotifyStarted => "notify_started",
            Self::WaitForWindow => "wait_for_window",
            Self::StartRevoke => "start_revoke",
            Self::Done => "done",
        }
    }
}
