use async_trait::async_trait;
use chrono::{DateTime, Utc};
use elevate_application::{
    RequestChangeEvent, RequestChangeFeed, RequestPage, RequestRepository, StatusUpdater,
};
use elevate_core::{AppError, AppResult, RequestId};
use elevate_domain::{AccessDuration, Request, RequestPatch, RequestStatus};
use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres, Transaction};

const PAGE_SIZE: i64 = 50;

/// How long a polled change event stays invisible before redelivery.
const REDELIVERY_DELAY_SECONDS: i32 = 60;

/// PostgreSQL-backed request table with a transactional change feed.
///
/// Every insert and update writes an event row in the same transaction as
/// the record mutation, so the feed observes exactly the mutations that
/// committed, ordered per request id.
#[derive(Clone)]
pub struct PostgresRequestRepository {
    pool: PgPool,
}

impl PostgresRequestRepository {
    /// Creates a request repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn append_change_event(
        transaction: &mut Transaction<'_, Postgres>,
        request_id: RequestId,
        old_image: Option<&Request>,
        new_image: &Request,
    ) -> AppResult<()> {
        let old_value = old_image
            .map(serde_json::to_value)
            .transpose()
            .map_err(|error| {
                AppError::Internal(format!("failed to serialize old request image: {error}"))
            })?;
        let new_value = serde_json::to_value(new_image).map_err(|error| {
            AppError::Internal(format!("failed to serialize new request image: {error}"))
        })?;

        sqlx::query(
            r#"
            INSERT INTO request_change_events (request_id, old_image, new_image)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(request_id.as_uuid())
        .bind(old_value)
        .bind(new_value)
        .execute(&mut **transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to append change event for request '{request_id}': {error}"
            ))
        })?;

        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct RequestRow {
    id: uuid::Uuid,
    email: String,
    username: String,
    user_id: String,
    account_id: String,
    account_name: String,
    role_name: String,
    role_id: String,
    start_time: DateTime<Utc>,
    duration: String,
    end_time: Option<DateTime<Utc>>,
    status: String,
    approval_required: bool,
    justification: Option<String>,
    comment: Option<String>,
    ticket_no: Option<String>,
    approver: Option<String>,
    approver_id: Option<String>,
    approvers: Value,
    approver_ids: Value,
    revoker: Option<String>,
    revoker_id: Option<String>,
    revoke_comment: Option<String>,
    session_duration: Option<String>,
}

const REQUEST_SELECT: &str = r#"
    SELECT
        id,
        email,
        username,
        user_id,
        account_id,
        account_name,
        role_name,
        role_id,
        start_time,
        duration,
        end_time,
        status,
        approval_required,
        justification,
        comment,
        ticket_no,
        approver,
        approver_id,
        approvers,
        approver_ids,
        revoker,
        revoker_id,
        revoke_comment,
        session_duration
    FROM requests
"#;

fn request_from_row(row: RequestRow) -> AppResult<Request> {
    Ok(Request {
        id: RequestId::from_uuid(row.id),
        email: row.email,
        username: row.username,
        user_id: row.user_id,
        account_id: row.account_id,
        account_name: row.account_name,
        role: row.role_name,
        role_id: row.role_id,
        start_time: row.start_time,
        duration: AccessDuration::parse(row.duration.as_str())?,
        end_time: row.end_time,
        status: RequestStatus::parse(row.status.as_str())?,
        approval_required: row.approval_required,
        justification: row.justification,
        comment: row.comment,
        ticket_no: row.ticket_no,
        approver: row.approver,
        approver_id: row.approver_id,
        approvers: string_list(&row.approvers, "approvers")?,
        approver_ids: string_list(&row.approver_ids, "approver_ids")?,
        revoker: row.revoker,
        revoker_id: row.revoker_id,
        revoke_comment: row.revoke_comment,
        session_duration: row.session_duration,
    })
}

fn string_list(value: &Value, field: &str) -> AppResult<Vec<String>> {
    serde_json::from_value(value.clone()).map_err(|error| {
        AppError::Internal(format!("invalid stored '{field}' list: {error}"))
    })
}

fn string_list_value(items: &[String]) -> Value {
    Value::Array(items.iter().cloned().map(Value::String).collect())
}

fn parse_page_token(page_token: Option<String>) -> AppResult<i64> {
    match page_token {
        None => Ok(0),
        Some(token) => token.parse::<i64>().map_err(|error| {
            AppError::Validation(format!("invalid page token '{token}': {error}"))
        }),
    }
}

fn next_page_token(offset: i64, page_len: usize) -> Option<String> {
    (page_len as i64 == PAGE_SIZE).then(|| (offset + PAGE_SIZE).to_string())
}

async fn write_request_row(
    transaction: &mut Transaction<'_, Postgres>,
    request: &Request,
    insert: bool,
) -> AppResult<()> {
    let statement = if insert {
        r#"
        INSERT INTO requests (
            id, email, username, user_id, account_id, account_name,
            role_name, role_id, start_time, duration, end_time, status,
            approval_required, justification, comment, ticket_no,
            approver, approver_id, approvers, approver_ids,
            revoker, revoker_id, revoke_comment, session_duration,
            updated_at
        )
        VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
            $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24,
            now()
        )
        "#
    } else {
        r#"
        UPDATE requests SET
            email = $2,
            username = $3,
            user_id = $4,
            account_id = $5,
            account_name = $6,
            role_name = $7,
            role_id = $8,
            start_time = $9,
            duration = $10,
            end_time = $11,
            status = $12,
            approval_required = $13,
            justification = $14,
            comment = $15,
            ticket_no = $16,
            approver = $17,
            approver_id = $18,
            approvers = $19,
            approver_ids = $20,
            revoker = $21,
            revoker_id = $22,
            revoke_comment = $23,
            session_duration = $24,
            updated_at = now()
        WHERE id = $1
        "#
    };

    sqlx::query(statement)
        .bind(request.id.as_uuid())
        .bind(request.email.as_str())
        .bind(request.username.as_str())
        .bind(request.user_id.as_str())
        .bind(request.account_id.as_str())
        .bind(request.account_name.as_str())
        .bind(request.role.as_str())
        .bind(request.role_id.as_str())
        .bind(request.start_time)
        .bind(request.duration.to_string())
        .bind(request.end_time)
        .bind(request.status.as_str())
        .bind(request.approval_required)
        .bind(request.justification.as_deref())
        .bind(request.comment.as_deref())
        .bind(request.ticket_no.as_deref())
        .bind(request.approver.as_deref())
        .bind(request.approver_id.as_deref())
        .bind(string_list_value(&request.approvers))
        .bind(string_list_value(&request.approver_ids))
        .bind(request.revoker.as_deref())
        .bind(request.revoker_id.as_deref())
        .bind(request.revoke_comment.as_deref())
        .bind(request.session_duration.as_deref())
        .execute(&mut **transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to persist request '{}': {error}",
                request.id
            ))
        })?;

    Ok(())
}

#[async_trait]
impl RequestRepository for PostgresRequestRepository {
    async fn get(&self, id: RequestId) -> AppResult<Option<Request>> {
        let row = sqlx::query_as::<_, RequestRow>(
            &format!("{REQUEST_SELECT} WHERE id = $1"),
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to read request '{id}': {error}"))
        })?;

        row.map(request_from_row).transpose()
    }

    async fn create(&self, request: Request) -> AppResult<()> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to start create transaction: {error}"))
        })?;

        write_request_row(&mut transaction, &request, true).await?;
        Self::append_change_event(&mut transaction, request.id, None, &request).await?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit create of request '{}': {error}",
                request.id
            ))
        })
    }

    async fn update(&self, id: RequestId, patch: RequestPatch) -> AppResult<Request> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to start update transaction: {error}"))
        })?;

        let row = sqlx::query_as::<_, RequestRow>(
            &format!("{REQUEST_SELECT} WHERE id = $1 FOR UPDATE"),
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to lock request '{id}': {error}"))
        })?;

        let old = row
            .map(request_from_row)
            .transpose()?
            .ok_or_else(|| AppError::NotFound(format!("request '{id}' does not exist")))?;

        let mut updated = old.clone();
        patch.apply(&mut updated)?;

        write_request_row(&mut transaction, &updated, false).await?;
        Self::append_change_event(&mut transaction, id, Some(&old), &updated).await?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to commit update of request '{id}': {error}"
            ))
        })?;

        Ok(updated)
    }

    async fn query_by_email_and_status(
        &self,
        email: &str,
        status: Option<RequestStatus>,
        page_token: Option<String>,
    ) -> AppResult<RequestPage> {
        let offset = parse_page_token(page_token)?;
        let rows = sqlx::query_as::<_, RequestRow>(&format!(
            r#"
            {REQUEST_SELECT}
            WHERE email = $1 AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY start_time DESC, id
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(email)
        .bind(status.map(|value| value.as_str()))
        .bind(PAGE_SIZE)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to query requests for email '{email}': {error}"
            ))
        })?;

        let items = rows
            .into_iter()
            .map(request_from_row)
            .collect::<AppResult<Vec<_>>>()?;
        let next_token = next_page_token(offset, items.len());

        Ok(RequestPage { items, next_token })
    }

    async fn query_by_approver_and_status(
        &self,
        approver_id: &str,
        status: Option<RequestStatus>,
        page_token: Option<String>,
    ) -> AppResult<RequestPage> {
        let offset = parse_page_token(page_token)?;
        let rows = sqlx::query_as::<_, RequestRow>(&format!(
            r#"
            {REQUEST_SELECT}
            WHERE approver_ids @> $1::JSONB
              AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY start_time DESC, id
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(Value::Array(vec![Value::String(approver_id.to_owned())]))
        .bind(status.map(|value| value.as_str()))
        .bind(PAGE_SIZE)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to query requests for approver '{approver_id}': {error}"
            ))
        })?;

        let items = rows
            .into_iter()
            .map(request_from_row)
            .collect::<AppResult<Vec<_>>>()?;
        let next_token = next_page_token(offset, items.len());

        Ok(RequestPage { items, next_token })
    }
}

#[async_trait]
impl StatusUpdater for PostgresRequestRepository {
    async fn update(&self, request_id: RequestId, patch: RequestPatch) -> AppResult<()> {
        RequestRepository::update(self, request_id, patch).await?;
        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct ChangeEventRow {
    id: i64,
    old_image: Option<Value>,
    new_image: Value,
    delivery_count: i32,
}

#[async_trait]
impl RequestChangeFeed for PostgresRequestRepository {
    async fn poll(&self, limit: usize) -> AppResult<Vec<RequestChangeEvent>> {
        let limit = i64::try_from(limit).map_err(|error| {
            AppError::Validation(format!("invalid change feed poll limit: {error}"))
        })?;

        let rows = sqlx::query_as::<_, ChangeEventRow>(
            r#"
            WITH candidate_events AS (
                SELECT id
                FROM request_change_events
                WHERE acked_at IS NULL AND visible_at <= now()
                ORDER BY id ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE request_change_events events
            SET
                delivery_count = events.delivery_count + 1,
                visible_at = now() + make_interval(secs => $2::INT)
            FROM candidate_events
            WHERE events.id = candidate_events.id
            RETURNING events.id, events.old_image, events.new_image, events.delivery_count
            "#,
        )
        .bind(limit)
        .bind(REDELIVERY_DELAY_SECONDS)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to poll change feed: {error}"))
        })?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let old = row
                .old_image
                .map(serde_json::from_value)
                .transpose()
                .map_err(|error| {
                    AppError::Internal(format!("corrupt old image in change event: {error}"))
                })?;
            let new = serde_json::from_value(row.new_image).map_err(|error| {
                AppError::Internal(format!("corrupt new image in change event: {error}"))
            })?;
            events.push(RequestChangeEvent {
                event_id: row.id.to_string(),
                old,
                new,
                delivery_count: u32::try_from(row.delivery_count).unwrap_or(u32::MAX),
            });
        }

        // Per-key ordering comes from the serial event id within one poll.
        Ok(events)
    }

    async fn ack(&self, event_id: &str) -> AppResult<()> {
        let id = parse_event_id(event_id)?;
        sqlx::query("UPDATE request_change_events SET acked_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to ack change event '{event_id}': {error}"))
            })?;
        Ok(())
    }

    async fn release(&self, event_id: &str) -> AppResult<()> {
        let id = parse_event_id(event_id)?;
        sqlx::query(
            "UPDATE request_change_events SET visible_at = now() WHERE id = $1 AND acked_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to release change event '{event_id}': {error}"
            ))
        })?;
        Ok(())
    }
}

fn parse_event_id(event_id: &str) -> AppResult<i64> {
    event_id.parse::<i64>().map_err(|error| {
        AppError::Validation(format!("invalid change event id '{event_id}': {error}"))
    })
}
