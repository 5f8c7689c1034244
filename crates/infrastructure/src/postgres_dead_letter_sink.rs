use async_trait::async_trait;
use elevate_application::{DeadLetterEntry, DeadLetterSink};
use elevate_core::{AppError, AppResult};
use sqlx::PgPool;
use tracing::error;

/// PostgreSQL-backed dead-letter channel for abandoned change events.
///
/// Rows stay until an operator replays or deletes them; the error log line
/// makes new entries visible without watching the table.
#[derive(Clone)]
pub struct PostgresDeadLetterSink {
    pool: PgPool,
}

impl PostgresDeadLetterSink {
    /// Creates a dead-letter sink with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeadLetterSink for PostgresDeadLetterSink {
    async fn publish(&self, entry: DeadLetterEntry) -> AppResult<()> {
        error!(
            event_id = entry.event_id.as_str(),
            request_id = %entry.request_id,
            reason = entry.reason.as_str(),
            "change event dead-lettered"
        );

        sqlx::query(
            r#"
            INSERT INTO request_dead_letters (event_id, request_id, reason, occurred_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(entry.event_id.as_str())
        .bind(entry.request_id.as_uuid())
        .bind(entry.reason.as_str())
        .bind(entry.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(|publish_error| {
            AppError::Internal(format!(
                "failed to persist dead-letter entry for event '{}': {publish_error}",
                entry.event_id
            ))
        })?;

        Ok(())
    }
}
