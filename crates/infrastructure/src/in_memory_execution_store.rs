use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use elevate_application::{
    ExecutionCheckpoint, ExecutionStatus, ExecutionStore, NewWorkflowExecution, WorkflowExecution,
};
use elevate_core::{AppError, AppResult};
use tokio::sync::Mutex;

#[derive(Default)]
struct Inner {
    executions: Vec<LeasedExecution>,
}

struct LeasedExecution {
    execution: WorkflowExecution,
    lease_expires_at: Option<DateTime<Utc>>,
}

/// In-memory execution store for tests and local runs.
///
/// Keeps the lease semantics of the Postgres adapter so worker behavior is
/// the same against either backend.
#[derive(Clone, Default)]
pub struct InMemoryExecutionStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryExecutionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn create(&self, new: NewWorkflowExecution) -> AppResult<Option<WorkflowExecution>> {
        let mut inner = self.inner.lock().await;
        if inner
            .executions
            .iter()
            .any(|entry| entry.execution.execution_key == new.execution_key)
        {
            return Ok(None);
        }

        let now = Utc::now();
        let execution = WorkflowExecution {
            execution_id: uuid::Uuid::new_v4().to_string(),
            execution_key: new.execution_key,
            kind: new.kind,
            input: new.input,
            state: new.state,
            status: ExecutionStatus::Runnable,
            resume_at: None,
            last_error: None,
            started_at: now,
            updated_at: now,
        };
        inner.executions.push(LeasedExecution {
            execution: execution.clone(),
            lease_expires_at: None,
        });
        Ok(Some(execution))
    }

    async fn checkpoint(
        &self,
        execution_id: &str,
        checkpoint: ExecutionCheckpoint,
    ) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .executions
            .iter_mut()
            .find(|entry| entry.execution.execution_id == execution_id)
            .ok_or_else(|| {
                AppError::NotFound(format!("execution '{execution_id}' does not exist"))
            })?;

        entry.execution.state = checkpoint.state;
        entry.execution.status = checkpoint.status;
        entry.execution.resume_at = checkpoint.resume_at;
        entry.execution.last_error = checkpoint.last_error;
        entry.execution.updated_at = Utc::now();
        if checkpoint.status != ExecutionStatus::Runnable {
            entry.lease_expires_at = None;
        }
        Ok(())
    }

    async fn claim_due(
        &self,
        _worker_id: &str,
        now: DateTime<Utc>,
        limit: usize,
        lease_seconds: u32,
    ) -> AppResult<Vec<WorkflowExecution>> {
        let mut inner = self.inner.lock().await;
        let lease_until = Utc::now() + chrono::Duration::seconds(i64::from(lease_seconds));

        let mut claimed = Vec::new();
        for entry in inner.executions.iter_mut() {
            if claimed.len() >= limit {
                break;
            }

            let due = match entry.execution.status {
                ExecutionStatus::Runnable => true,
                ExecutionStatus::Waiting => entry
                    .execution
                    .resume_at
                    .is_some_and(|resume_at| resume_at <= now),
                ExecutionStatus::Completed | ExecutionStatus::Failed => false,
            };
            let lease_free = entry
                .lease_expires_at
                .is_none_or(|expires_at| expires_at < Utc::now());

            if due && lease_free {
                entry.lease_expires_at = Some(lease_until);
                claimed.push(entry.execution.clone());
            }
        }

        Ok(claimed)
    }

    async fn find(&self, execution_id: &str) -> AppResult<Option<WorkflowExecution>> {
        Ok(self
            .inner
            .lock()
            .await
            .executions
            .iter()
            .find(|entry| entry.execution.execution_id == execution_id)
            .map(|entry| entry.execution.clone()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use elevate_application::{
        ExecutionCheckpoint, ExecutionStatus, ExecutionStore, NewWorkflowExecution, WorkflowInput,
        WorkflowKind,
    };
    use elevate_domain::{AccessDuration, Request, RequestDraft};

    use super::InMemoryExecutionStore;

    fn new_execution(key: &str) -> NewWorkflowExecution {
        let Ok(duration) = AccessDuration::from_hours(1) else {
            panic!("duration should validate");
        };
        let Ok(request) = Request::new(RequestDraft {
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

        NewWorkflowExecution {
            execution_key: key.to_owned(),
            kind: WorkflowKind::Grant,
            input: WorkflowInput { request },
            state: serde_json::json!({"workflow": "grant", "step": {"state": "grant_permission"}}),
        }
    }

    #[tokio::test]
    async fn duplicate_keys_create_nothing() {
        let store = InMemoryExecutionStore::new();
        let first = store.create(new_execution("grant:r1:pending")).await;
        assert!(first.is_ok_and(|execution| execution.is_some()));

        let second = store.create(new_execution("grant:r1:pending")).await;
        assert!(second.is_ok_and(|execution| execution.is_none()));
    }

    #[tokio::test]
    async fn leased_executions_are_not_claimed_twice() {
        let store = InMemoryExecutionStore::new();
        assert!(store.create(new_execution("grant:r1:pending")).await.is_ok());

        let Ok(first) = store.claim_due("worker-1", Utc::now(), 10, 30).await else {
            panic!("claim should succeed");
        };
        assert_eq!(first.len(), 1);

        let Ok(second) = store.claim_due("worker-2", Utc::now(), 10, 30).await else {
            panic!("claim should succeed");
        };
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn waiting_executions_become_due_at_their_deadline() {
        let store = InMemoryExecutionStore::new();
        let Ok(Some(execution)) = store.create(new_execution("grant:r1:pending")).await else {
            panic!("create should succeed");
        };

        let resume_at = Utc::now() + Duration::hours(1);
        let checkpoint = ExecutionCheckpoint {
            state: execution.state.clone(),
            status: ExecutionStatus::Waiting,
            resume_at: Some(resume_at),
            last_error: None,
        };
        assert!(
            store
                .checkpoint(execution.execution_id.as_str(), checkpoint)
                .await
                .is_ok()
        );

        let Ok(early) = store.claim_due("worker-1", Utc::now(), 10, 30).await else {
            panic!("claim should succeed");
        };
        assert!(early.is_empty());

        let Ok(due) = store
            .claim_due("worker-1", resume_at + Duration::seconds(1), 10, 30)
            .await
        else {
            panic!("claim should succeed");
        };
        assert_eq!(due.len(), 1);
    }
}
