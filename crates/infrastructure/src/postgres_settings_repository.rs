use async_trait::async_trait;
use elevate_application::SettingsProvider;
use elevate_core::{AppError, AppResult};
use elevate_domain::Settings;
use sqlx::{FromRow, PgPool};

/// PostgreSQL-backed settings store.
///
/// The table holds at most one row; a missing row yields the defaults so a
/// fresh deployment works before an administrator ever saved anything.
#[derive(Clone)]
pub struct PostgresSettingsRepository {
    pool: PgPool,
}

impl PostgresSettingsRepository {
    /// Creates a settings repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persists new settings through the administrative path.
    pub async fn save(&self, settings: &Settings) -> AppResult<()> {
        settings.validate()?;

        sqlx::query(
            r#"
            INSERT INTO settings (
                id, default_duration_hours, approval_expiry_hours,
                comments_required, ticket_required, approval_required,
                email_notifications_enabled, webhook_notifications_enabled,
                source_email, audit_webhook_url, admin_group, auditor_group,
                modified_by, updated_at
            )
            VALUES (1, $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, now())
            ON CONFLICT (id)
            DO UPDATE SET
                default_duration_hours = EXCLUDED.default_duration_hours,
                approval_expiry_hours = EXCLUDED.approval_expiry_hours,
                comments_required = EXCLUDED.comments_required,
                ticket_required = EXCLUDED.ticket_required,
                approval_required = EXCLUDED.approval_required,
                email_notifications_enabled = EXCLUDED.email_notifications_enabled,
                webhook_notifications_enabled = EXCLUDED.webhook_notifications_enabled,
                source_email = EXCLUDED.source_email,
                audit_webhook_url = EXCLUDED.audit_webhook_url,
                admin_group = EXCLUDED.admin_group,
                auditor_group = EXCLUDED.auditor_group,
                modified_by = EXCLUDED.modified_by,
                updated_at = now()
            "#,
        )
        .bind(i32::try_from(settings.default_duration_hours).map_err(|error| {
            AppError::Validation(format!("invalid default_duration_hours: {error}"))
        })?)
        .bind(i32::try_from(settings.approval_expiry_hours).map_err(|error| {
            AppError::Validation(format!("invalid approval_expiry_hours: {error}"))
        })?)
        .bind(settings.comments_required)
        .bind(settings.ticket_required)
        .bind(settings.approval_required)
        .bind(settings.email_notifications_enabled)
        .bind(settings.webhook_notifications_enabled)
        .bind(settings.source_email.as_deref())
        .bind(settings.audit_webhook_url.as_deref())
        .bind(settings.admin_group.as_deref())
        .bind(settings.auditor_group.as_deref())
        .bind(settings.modified_by.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to save settings: {error}")))?;

        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct SettingsRow {
    default_duration_hours: i32,
    approval_expiry_hours: i32,
    comments_required: bool,
    ticket_required: bool,
    approval_required: bool,
    email_notifications_enabled: bool,
    webhook_notifications_enabled: bool,
    source_email: Option<String>,
    audit_webhook_url: Option<String>,
    admin_group: Option<String>,
    auditor_group: Option<String>,
    modified_by: Option<String>,
}

#[async_trait]
impl SettingsProvider for PostgresSettingsRepository {
    async fn current(&self) -> AppResult<Settings> {
        let row = sqlx::query_as::<_, SettingsRow>(
            r#"
            SELECT
                default_duration_hours, approval_expiry_hours,
                comments_required, ticket_required, approval_required,
                email_notifications_enabled, webhook_notifications_enabled,
                source_email, audit_webhook_url, admin_group, auditor_group,
                modified_by
            FROM settings
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to read settings: {error}")))?;

        let Some(row) = row else {
            return Ok(Settings::default());
        };

        Ok(Settings {
            default_duration_hours: u32::try_from(row.default_duration_hours)
                .map_err(|error| {
                    AppError::Internal(format!("invalid stored default_duration_hours: {error}"))
                })?,
            approval_expiry_hours: u32::try_from(row.approval_expiry_hours).map_err(|error| {
                AppError::Internal(format!("invalid stored approval_expiry_hours: {error}"))
            })?,
            comments_required: row.comments_required,
            ticket_required: row.ticket_required,
            approval_required: row.approval_required,
            email_notifications_enabled: row.email_notifications_enabled,
            webhook_notifications_enabled: row.webhook_notifications_enabled,
            source_email: row.source_email,
            audit_webhook_url: row.audit_webhook_url,
            admin_group: row.admin_group,
            auditor_group: row.auditor_group,
            modified_by: row.modified_by,
        })
    }
}
