//! SMTP notifier using the `lettre` crate.

use async_trait::async_trait;
use elevate_application::{NotificationEvent, NotificationKind, Notifier};
use elevate_core::{AppError, AppResult};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// SMTP notifier configuration.
#[derive(Debug, Clone)]
pub struct SmtpNotifierConfig {
    /// SMTP server hostname.
    pub host: String,
    /// SMTP server port.
    pub port: u16,
    /// SMTP username.
    pub username: String,
    /// SMTP password.
    pub password: String,
    /// Sender email address.
    pub from_address: String,
}

/// Production notifier delivering lifecycle emails over SMTP.
#[derive(Clone)]
pub struct SmtpNotifier {
    config: SmtpNotifierConfig,
}

impl SmtpNotifier {
    /// Creates a new SMTP notifier.
    #[must_use]
    pub fn new(config: SmtpNotifierConfig) -> Self {
        Self { config }
    }
}

fn subject_for(event: &NotificationEvent) -> String {
    let request = &event.request;
    match event.kind {
        NotificationKind::ApprovalPending => {
            format!("Approval required: {} on {}", request.role, request.account_name)
        }
        NotificationKind::Scheduled => {
            format!("Access scheduled: {} on {}", request.role, request.account_name)
        }
        NotificationKind::AccessStarted => {
            format!("Access started: {} on {}", request.role, request.account_name)
        }
        NotificationKind::AccessError => {
            format!("Access request failed: {} on {}", request.role, request.account_name)
        }
        NotificationKind::SessionEnded => {
            format!("Access ended: {} on {}", request.role, request.account_name)
        }
        NotificationKind::Expired => {
            format!("Request expired: {} on {}", request.role, request.account_name)
        }
        NotificationKind::Rejected => {
            format!("Request rejected: {} on {}", request.role, request.account_name)
        }
        NotificationKind::Cancelled => {
            format!("Request cancelled: {} on {}", request.role, request.account_name)
        }
    }
}

fn body_for(event: &NotificationEvent) -> String {
    let request = &event.request;
    let mut lines = vec![
        format!("Request: {}", request.id),
        format!("Requester: {} <{}>", request.username, request.email),
        format!("Account: {} ({})", request.account_name, request.account_id),
        format!("Role: {}", request.role),
        format!("Start: {}", request.start_time),
        format!("Duration: {}", request.duration),
    ];

    if let Some(justification) = &request.justification {
        lines.push(format!("Justification: {justification}"));
    }
    if let Some(ticket_no) = &request.ticket_no {
        lines.push(format!("Ticket: {ticket_no}"));
    }

    lines.join("\n")
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, event: NotificationEvent) -> AppResult<()> {
        let from: lettre::message::Mailbox = self
            .config
            .from_address
            .parse()
            .map_err(|error| AppError::Internal(format!("invalid from address: {error}")))?;

        let subject = subject_for(&event);
        let body = body_for(&event);

        let credentials =
            Credentials::new(self.config.username.clone(), self.config.password.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.host)
            .map_err(|error| {
                AppError::Internal(format!("failed to create SMTP transport: {error}"))
            })?
            .port(self.config.port)
            .credentials(credentials)
            .build();

        for recipient in event.recipients() {
            let to_mailbox = recipient.parse().map_err(|error| {
                AppError::Internal(format!("invalid recipient address '{recipient}': {error}"))
            })?;

            let message = Message::builder()
                .from(from.clone())
                .to(to_mailbox)
                .subject(subject.clone())
                .header(ContentType::TEXT_PLAIN)
                .body(body.clone())
                .map_err(|error| {
                    AppError::Internal(format!("failed to build email: {error}"))
                })?;

            mailer.send(message).await.map_err(|error| {
                AppError::Internal(format!("failed to send email: {error}"))
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use elevate_application::{NotificationEvent, NotificationKind};
    use elevate_domain::{AccessDuration, Request, RequestDraft};

    use super::{body_for, subject_for};

    fn event(kind: NotificationKind) -> NotificationEvent {
        let Ok(duration) = AccessDuration::from_hours(2) else {
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
            justification: Some("release support".to_owned()),
            ticket_no: Some("CHG-1234".to_owned()),
            approvers: Vec::new(),
            approver_ids: Vec::new(),
        }) else {
            panic!("draft should validate");
        };
        NotificationEvent { kind, request }
    }

    #[test]
    fn subject_names_the_lifecycle_moment() {
        let subject = subject_for(&event(NotificationKind::AccessStarted));
        assert_eq!(subject, "Access started: ReadOnlyAccess on Sandbox");
    }

    #[test]
    fn body_carries_justification_and_ticket() {
        let body = body_for(&event(NotificationKind::ApprovalPending));
        assert!(body.contains("Justification: release support"));
        assert!(body.contains("Ticket: CHG-1234"));
    }
}
