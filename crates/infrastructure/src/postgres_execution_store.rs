use async_trait::async_trait;
use chrono::{DateTime, Utc};
use elevate_application::{
    ExecutionCheckpoint, ExecutionStatus, ExecutionStore, NewWorkflowExecution, WorkflowExecution,
    WorkflowInput, WorkflowKind,
};
use elevate_core::{AppError, AppResult};
use serde_json::Value;
use sqlx::{FromRow, PgPool};

/// PostgreSQL-backed durable execution store.
///
/// Claims use `FOR UPDATE SKIP LOCKED` plus a bounded lease, so parallel
/// workers never run the same execution concurrently and a crashed worker's
/// executions become claimable again when its lease expires.
#[derive(Clone)]
pub struct PostgresExecutionStore {
    pool: PgPool,
}

impl PostgresExecutionStore {
    /// Creates an execution store with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ExecutionRow {
    id: uuid::Uuid,
    execution_key: String,
    kind: String,
    input: Value,
    state: Value,
    status: String,
    resume_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn execution_from_row(row: ExecutionRow) -> AppResult<WorkflowExecution> {
    let input: WorkflowInput = serde_json::from_value(row.input).map_err(|error| {
        AppError::Internal(format!(
            "corrupt input payload for execution '{}': {error}",
            row.id
        ))
    })?;

    Ok(WorkflowExecution {
        execution_id: row.id.to_string(),
        execution_key: row.execution_key,
        kind: WorkflowKind::parse(row.kind.as_str())?,
        input,
        state: row.state,
        status: ExecutionStatus::parse(row.status.as_str())?,
        resume_at: row.resume_at,
        last_error: row.last_error,
        started_at: row.started_at,
        updated_at: row.updated_at,
    })
}

const EXECUTION_COLUMNS: &str = r#"
    id,
    execution_key,
    kind,
    input,
    state,
    status,
    resume_at,
    last_error,
    started_at,
    updated_at
"#;

#[async_trait]
impl ExecutionStore for PostgresExecutionStore {
    async fn create(&self, new: NewWorkflowExecution) -> AppResult<Option<WorkflowExecution>> {
        let input = serde_json::to_value(&new.input).map_err(|error| {
            AppError::Internal(format!("failed to serialize execution input: {error}"))
        })?;

        let row = sqlx::query_as::<_, ExecutionRow>(&format!(
            r#"
            INSERT INTO workflow_executions (
                execution_key,
                kind,
                input,
                state,
                status,
                started_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, 'runnable', now(), now())
            ON CONFLICT (execution_key) DO NOTHING
            RETURNING {EXECUTION_COLUMNS}
            "#
        ))
        .bind(new.execution_key.as_str())
        .bind(new.kind.as_str())
        .bind(input)
        .bind(new.state)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to create execution '{}': {error}",
                new.execution_key
            ))
        })?;

        row.map(execution_from_row).transpose()
    }

    async fn checkpoint(
        &self,
        execution_id: &str,
        checkpoint: ExecutionCheckpoint,
    ) -> AppResult<()> {
        let id = parse_execution_id(execution_id)?;

        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET
                state = $2,
                status = $3,
                resume_at = $4,
                last_error = $5,
                updated_at = now(),
                leased_by = CASE WHEN $3 = 'runnable' THEN leased_by ELSE NULL END,
                lease_expires_at = CASE WHEN $3 = 'runnable' THEN lease_expires_at ELSE NULL END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(checkpoint.state)
        .bind(checkpoint.status.as_str())
        .bind(checkpoint.resume_at)
        .bind(checkpoint.last_error.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to checkpoint execution '{execution_id}': {error}"
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "execution '{execution_id}' does not exist"
            )));
        }

        Ok(())
    }

    async fn claim_due(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
        limit: usize,
        lease_seconds: u32,
    ) -> AppResult<Vec<WorkflowExecution>> {
        let limit = i64::try_from(limit).map_err(|error| {
            AppError::Validation(format!("invalid execution claim limit: {error}"))
        })?;
        let lease_seconds = i32::try_from(lease_seconds).map_err(|error| {
            AppError::Validation(format!("invalid execution lease_seconds: {error}"))
        })?;

        let rows = sqlx::query_as::<_, ExecutionRow>(
            r#"
            WITH due_executions AS (
                SELECT id
                FROM workflow_executions
                WHERE (
                        status = 'runnable'
                        OR (status = 'waiting' AND resume_at <= $2)
                      )
                  AND (lease_expires_at IS NULL OR lease_expires_at < now())
                ORDER BY updated_at ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            UPDATE workflow_executions executions
            SET
                leased_by = $1,
                lease_expires_at = now() + make_interval(secs => $4::INT)
            FROM due_executions
            WHERE executions.id = due_executions.id
            RETURNING
                executions.id,
                executions.execution_key,
                executions.kind,
                executions.input,
                executions.state,
                executions.status,
                executions.resume_at,
                executions.last_error,
                executions.started_at,
                executions.updated_at
            "#,
        )
        .bind(worker_id)
        .bind(now)
        .bind(limit)
        .bind(lease_seconds)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to claim due executions for worker '{worker_id}': {error}"
            ))
        })?;

        rows.into_iter().map(execution_from_row).collect()
    }

    async fn find(&self, execution_id: &str) -> AppResult<Option<WorkflowExecution>> {
        let id = parse_execution_id(execution_id)?;

        let row = sqlx::query_as::<_, ExecutionRow>(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM workflow_executions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to read execution '{execution_id}': {error}"
            ))
        })?;

        row.map(execution_from_row).transpose()
    }
}

fn parse_execution_id(execution_id: &str) -> AppResult<uuid::Uuid> {
    uuid::Uuid::parse_str(execution_id).map_err(|error| {
        AppError::Validation(format!("invalid execution id '{execution_id}': {error}"))
    })
}
