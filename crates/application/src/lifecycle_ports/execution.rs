use async_trait::async_trait;
use chrono::{DateTime, Utc};
use elevate_core::{AppError, AppResult};
use elevate_domain::Request;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which of the five lifecycle machines an execution runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    /// Grants access and schedules the revoke at window end.
    Grant,
    /// Removes access and closes the record.
    Revoke,
    /// Holds a request until its future start time.
    Schedule,
    /// Watches a pending request for approval expiry.
    Approval,
    /// Notifies the requester of a rejected or cancelled request.
    Reject,
}

impl WorkflowKind {
    /// Returns the stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grant => "grant",
            Self::Revoke => "revoke",
            Self::Schedule => "schedule",
            Self::Approval => "approval",
            Self::Reject => "reject",
        }
    }

    /// Parses the stable storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "grant" => Ok(Self::Grant),
            "revoke" => Ok(Self::Revoke),
            "schedule" => Ok(Self::Schedule),
            "approval" => Ok(Self::Approval),
            "reject" => Ok(Self::Reject),
            _ => Err(AppError::Validation(format!(
                "unknown workflow kind '{value}'"
            ))),
        }
    }
}

/// Input payload carried by one execution.
///
/// Self-contained: the request snapshot holds every identifier a machine
/// needs, so any worker can resume the execution from storage alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInput {
    /// Request image captured when the execution started.
    pub request: Request,
}

/// Run state of one durable execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Ready to run as soon as a worker claims it.
    Runnable,
    /// Suspended until `resume_at`.
    Waiting,
    /// Machine reached its terminal state.
    Completed,
    /// Engine gave up; operator attention required.
    Failed,
}

impl ExecutionStatus {
    /// Returns the stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Runnable => "runnable",
            Self::Waiting => "waiting",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses the stable storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "runnable" => Ok(Self::Runnable),
            "waiting" => Ok(Self::Waiting),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(AppError::Validation(format!(
                "unknown execution status '{value}'"
            ))),
        }
    }
}

/// One durable workflow execution.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowExecution {
    /// Stable execution identifier.
    pub execution_id: String,
    /// Idempotency key; one execution per key, ever.
    pub execution_key: String,
    /// Which machine this execution runs.
    pub kind: WorkflowKind,
    /// Input payload captured at start.
    pub input: WorkflowInput,
    /// Serialized machine state, checkpointed after every transition.
    pub state: Value,
    /// Current run state.
    pub status: ExecutionStatus,
    /// Wake-up deadline while `Waiting`.
    pub resume_at: Option<DateTime<Utc>>,
    /// Failure detail when `Failed`.
    pub last_error: Option<String>,
    /// When the execution was created.
    pub started_at: DateTime<Utc>,
    /// When the execution last checkpointed.
    pub updated_at: DateTime<Utc>,
}

/// Creation payload for one execution.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWorkflowExecution {
    /// Idempotency key; a duplicate key must not create a second execution.
    pub execution_key: String,
    /// Which machine to run.
    pub kind: WorkflowKind,
    /// Input payload.
    pub input: WorkflowInput,
    /// Initial serialized machine state.
    pub state: Value,
}

/// Durable checkpoint written after each machine transition.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionCheckpoint {
    /// Serialized machine state.
    pub state: Value,
    /// New run state.
    pub status: ExecutionStatus,
    /// Wake-up deadline when suspending.
    pub resume_at: Option<DateTime<Utc>>,
    /// Failure detail when failing.
    pub last_error: Option<String>,
}

/// Durable store for workflow executions.
///
/// Suspension survives process restarts because machine state lives here,
/// never in worker memory.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Creates one execution; returns `None` when the key already exists.
    async fn create(&self, new: NewWorkflowExecution) -> AppResult<Option<WorkflowExecution>>;

    /// Persists a checkpoint for one execution.
    async fn checkpoint(
        &self,
        execution_id: &str,
        checkpoint: ExecutionCheckpoint,
    ) -> AppResult<()>;

    /// Claims due executions for one worker with a bounded lease.
    ///
    /// Due means runnable, or waiting with `resume_at` at or before `now`,
    /// or leased with an expired lease.
    async fn claim_due(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
        limit: usize,
        lease_seconds: u32,
    ) -> AppResult<Vec<WorkflowExecution>>;

    /// Returns one execution by id.
    async fn find(&self, execution_id: &str) -> AppResult<Option<WorkflowExecution>>;
}
