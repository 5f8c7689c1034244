use async_trait::async_trait;
use chrono::{DateTime, Utc};
use elevate_application::SessionRepository;
use elevate_core::{AppError, AppResult, RequestId};
use elevate_domain::Session;
use serde_json::Value;
use sqlx::PgPool;

/// PostgreSQL-backed audit session store.
#[derive(Clone)]
pub struct PostgresSessionRepository {
    pool: PgPool,
}

impl PostgresSessionRepository {
    /// Creates a session repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PostgresSessionRepository {
    async fn create(&self, session: Session) -> AppResult<()> {
        let session_id = uuid::Uuid::parse_str(session.id.as_str()).map_err(|error| {
            AppError::Validation(format!("invalid session id '{}': {error}", session.id))
        })?;
        let approver_ids = Value::Array(
            session
                .approver_ids
                .iter()
                .cloned()
                .map(Value::String)
                .collect(),
        );

        sqlx::query(
            r#"
            INSERT INTO sessions (
                id, request_id, username, account_id, role_name,
                approver_ids, start_time, end_time, query_id, expire_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(session_id)
        .bind(session.request_id.as_uuid())
        .bind(session.username.as_str())
        .bind(session.account_id.as_str())
        .bind(session.role.as_str())
        .bind(approver_ids)
        .bind(session.start_time)
        .bind(session.end_time)
        .bind(session.query_id.as_deref())
        .bind(session.expire_at)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to create session for request '{}': {error}",
                session.request_id
            ))
        })?;

        Ok(())
    }

    async fn close(&self, request_id: RequestId, end_time: DateTime<Utc>) -> AppResult<()> {
        // A closed session is immutable; only open sessions accept an end time.
        sqlx::query(
            "UPDATE sessions SET end_time = $2 WHERE request_id = $1 AND end_time IS NULL",
        )
        .bind(request_id.as_uuid())
        .bind(end_time)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to close session for request '{request_id}': {error}"
            ))
        })?;

        Ok(())
    }
}
