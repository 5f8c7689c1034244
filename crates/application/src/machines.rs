//! The five lifecycle state machines, encoded as data.
//!
//! Each machine is a serde-serializable tagged-state enum. A state names
//! exactly one side effect; the engine performs it and feeds the outcome
//! back through the machine's pure `advance` function. Waits are states
//! like any other: the engine persists a resume deadline and suspends the
//! execution instead of sleeping in memory.

mod approval;
mod grant;
mod reject;
mod revoke;
mod schedule;

use elevate_core::AppError;
use elevate_domain::{Request, RequestStatus};
use serde::{Deserialize, Serialize};

use crate::lifecycle_ports::{NotificationKind, WorkflowKind};

pub use approval::ApprovalState;
pub use grant::GrantState;
pub use reject::RejectState;
pub use revoke::RevokeState;
pub use schedule::ScheduleState;

/// Side effect requested by a machine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Create the permission assignment for the request.
    GrantAccess,
    /// Delete the permission assignment for the request.
    RevokeAccess,
    /// Persist a new lifecycle status on the request record.
    UpdateStatus(RequestStatus),
    /// Persist the actual grant timestamp; optionally open the audit session.
    RecordStartTime {
        /// Whether an audit session should be opened alongside.
        open_session: bool,
    },
    /// Persist the actual end-of-window timestamp and close the session.
    RecordEndTime,
    /// Read the currently persisted status of the request.
    ReadStatus,
    /// Send one notification.
    Notify(NotificationKind),
    /// Suspend for the request's window length, measured from entry.
    WaitForDuration,
    /// Suspend for the approval expiry window, read from settings at entry.
    WaitForApprovalExpiry,
    /// Suspend until the request's absolute start time.
    WaitUntilStartTime,
    /// Start a successor workflow for the same request.
    StartWorkflow(WorkflowKind),
}

impl Effect {
    /// Returns true when performing this effect suspends the execution.
    #[must_use]
    pub fn is_wait(&self) -> bool {
        matches!(
            self,
            Self::WaitForDuration | Self::WaitForApprovalExpiry | Self::WaitUntilStartTime
        )
    }
}

/// Outcome the engine feeds back after performing an effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectOutcome {
    /// The effect completed (or its failure was absorbed as bookkeeping).
    Succeeded,
    /// The effect failed permanently; the message is captured for the
    /// machine to branch on.
    Failed(String),
    /// A status read returned this value.
    StatusRead(RequestStatus),
    /// A wait deadline elapsed.
    TimerFired,
}

/// Aggregate state over the five machines, as persisted per execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "workflow", content = "step", rename_all = "snake_case")]
pub enum MachineState {
    /// Grant machine state.
    Grant(GrantState),
    /// Revoke machine state.
    Revoke(RevokeState),
    /// Schedule machine state.
    Schedule(ScheduleState),
    /// Approval machine state.
    Approval(ApprovalState),
    /// Reject machine state.
    Reject(RejectState),
}

impl MachineState {
    /// Returns the entry state for one workflow kind.
    #[must_use]
    pub fn initial(kind: WorkflowKind, request: &Request) -> Self {
        match kind {
            WorkflowKind::Grant => Self::Grant(GrantState::initial()),
            WorkflowKind::Revoke => Self::Revoke(RevokeState::initial()),
            WorkflowKind::Schedule => Self::Schedule(ScheduleState::initial()),
            WorkflowKind::Approval => Self::Approval(ApprovalState::initial()),
            WorkflowKind::Reject => Self::Reject(RejectState::initial(request)),
        }
    }

    /// Returns which machine this state belongs to.
    #[must_use]
    pub fn kind(&self) -> WorkflowKind {
        match self {
            Self::Grant(_) => WorkflowKind::Grant,
            Self::Revoke(_) => WorkflowKind::Revoke,
            Self::Schedule(_) => WorkflowKind::Schedule,
            Self::Approval(_) => WorkflowKind::Approval,
            Self::Reject(_) => WorkflowKind::Reject,
        }
    }

    /// Returns the effect this state asks for, or `None` when terminal.
    #[must_use]
    pub fn effect(&self) -> Option<Effect> {
        match self {
            Self::Grant(state) => state.effect(),
            Self::Revoke(state) => state.effect(),
            Self::Schedule(state) => state.effect(),
            Self::Approval(state) => state.effect(),
            Self::Reject(state) => state.effect(),
        }
    }

    /// Applies one effect outcome and returns the next state.
    pub fn advance(self, outcome: &EffectOutcome) -> Result<Self, AppError> {
        match self {
            Self::Grant(state) => state.advance(outcome).map(Self::Grant),
            Self::Revoke(state) => state.advance(outcome).map(Self::Revoke),
            Self::Schedule(state) => state.advance(outcome).map(Self::Schedule),
            Self::Approval(state) => state.advance(outcome).map(Self::Approval),
            Self::Reject(state) => state.advance(outcome).map(Self::Reject),
        }
    }
}

pub(crate) fn unexpected_outcome(
    workflow: &str,
    state: &str,
    outcome: &EffectOutcome,
) -> AppError {
    AppError::Internal(format!(
        "{workflow} workflow cannot advance from '{state}' on outcome {outcome:?}"
    ))
}
