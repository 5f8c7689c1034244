use elevate_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Process-wide lifecycle configuration.
///
/// Read-mostly; mutated only through an administrative path. Workflows read
/// the latest snapshot at each decision point rather than caching one across
/// a long wait, since an administrator may change policy while a request is
/// suspended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Default access window length in hours for new requests.
    pub default_duration_hours: u32,
    /// Hours a pending request may wait for an approval decision.
    pub approval_expiry_hours: u32,
    /// Whether submissions must carry a justification comment.
    pub comments_required: bool,
    /// Whether submissions must carry a ticket reference.
    pub ticket_required: bool,
    /// Global approval toggle; eligibility policy may override per target.
    pub approval_required: bool,
    /// Whether email notifications are delivered.
    pub email_notifications_enabled: bool,
    /// Whether webhook notifications are delivered.
    pub webhook_notifications_enabled: bool,
    /// Sender address for email notifications.
    pub source_email: Option<String>,
    /// Endpoint for audit webhook notifications.
    pub audit_webhook_url: Option<String>,
    /// Directory group whose members administer the system.
    pub admin_group: Option<String>,
    /// Directory group whose members may read every record.
    pub auditor_group: Option<String>,
    /// Who last changed these settings.
    pub modified_by: Option<String>,
}

impl Settings {
    /// Validates field ranges after an administrative update.
    pub fn validate(&self) -> AppResult<()> {
        if self.default_duration_hours == 0 {
            return Err(AppError::Validation(
                "default_duration_hours must be greater than zero".to_owned(),
            ));
        }

        if self.approval_expiry_hours == 0 {
            return Err(AppError::Validation(
                "approval_expiry_hours must be greater than zero".to_owned(),
            ));
        }

        Ok(())
    }

    /// Returns the approval expiry window as a chrono duration.
    #[must_use]
    pub fn approval_expiry(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.approval_expiry_hours))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_duration_hours: 1,
            approval_expiry_hours: 3,
            comments_required: true,
            ticket_required: false,
            approval_required: true,
            email_notifications_enabled: false,
            webhook_notifications_enabled: false,
            source_email: None,
            audit_webhook_url: None,
            admin_group: None,
            auditor_group: None,
            modified_by: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Settings;

    #[test]
    fn defaults_validate() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn zero_expiry_is_rejected() {
        let settings = Settings {
            approval_expiry_hours: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }
}
