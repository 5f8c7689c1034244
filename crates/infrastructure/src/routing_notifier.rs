use std::sync::Arc;

use async_trait::async_trait;
use elevate_application::{NotificationEvent, Notifier, SettingsProvider};
use elevate_core::{AppError, AppResult};
use tracing::warn;

/// Notifier that routes each event through the channels enabled in
/// settings.
///
/// The toggles are read per event, not at construction, so an
/// administrator enabling or disabling a channel affects requests that are
/// already mid-lifecycle.
pub struct RoutingNotifier {
    settings_provider: Arc<dyn SettingsProvider>,
    email: Option<Arc<dyn Notifier>>,
    webhook: Option<Arc<dyn Notifier>>,
    fallback: Arc<dyn Notifier>,
}

impl RoutingNotifier {
    /// Creates a routing notifier; the fallback receives every event when
    /// no channel is enabled.
    #[must_use]
    pub fn new(settings_provider: Arc<dyn SettingsProvider>, fallback: Arc<dyn Notifier>) -> Self {
        Self {
            settings_provider,
            email: None,
            webhook: None,
            fallback,
        }
    }

    /// Adds the email channel.
    #[must_use]
    pub fn with_email(mut self, email: Arc<dyn Notifier>) -> Self {
        self.email = Some(email);
        self
    }

    /// Adds the webhook channel.
    #[must_use]
    pub fn with_webhook(mut self, webhook: Arc<dyn Notifier>) -> Self {
        self.webhook = Some(webhook);
        self
    }
}

#[async_trait]
impl Notifier for RoutingNotifier {
    async fn notify(&self, event: NotificationEvent) -> AppResult<()> {
        let settings = self.settings_provider.current().await?;

        let mut delivered = false;
        let mut first_failure: Option<AppError> = None;

        if settings.email_notifications_enabled
            && let Some(email) = &self.email
        {
            match email.notify(event.clone()).await {
                Ok(()) => delivered = true,
                Err(channel_error) => {
                    warn!(
                        notification = event.kind.as_str(),
                        request_id = %event.request.id,
                        error = %channel_error,
                        "email notification channel failed"
                    );
                    first_failure.get_or_insert(channel_error);
                }
            }
        }

        if settings.webhook_notifications_enabled
            && let Some(webhook) = &self.webhook
        {
            match webhook.notify(event.clone()).await {
                Ok(()) => delivered = true,
                Err(channel_error) => {
                    warn!(
                        notification = event.kind.as_str(),
                        request_id = %event.request.id,
                        error = %channel_error,
                        "webhook notification channel failed"
                    );
                    first_failure.get_or_insert(channel_error);
                }
            }
        }

        if delivered {
            return Ok(());
        }

        if let Some(failure) = first_failure {
            return Err(failure);
        }

        self.fallback.notify(event).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use elevate_application::{
        NotificationEvent, NotificationKind, Notifier, SettingsProvider,
    };
    use elevate_core::{AppError, AppResult};
    use elevate_domain::{AccessDuration, Request, RequestDraft, Settings};

    use super::RoutingNotifier;

    struct StaticSettings(Settings);

    #[async_trait]
    impl SettingsProvider for StaticSettings {
        async fn current(&self) -> AppResult<Settings> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct CountingNotifier {
        delivered: AtomicUsize,
        failing: bool,
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn notify(&self, _event: NotificationEvent) -> AppResult<()> {
            if self.failing {
                return Err(AppError::Internal("channel down".to_owned()));
            }
            self.delivered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn event() -> NotificationEvent {
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
        NotificationEvent {
            kind: NotificationKind::AccessStarted,
            request,
        }
    }

    #[tokio::test]
    async fn disabled_channels_fall_back() {
        let fallback = Arc::new(CountingNotifier::default());
        let email = Arc::new(CountingNotifier::default());
        let notifier = RoutingNotifier::new(
            Arc::new(StaticSettings(Settings::default())),
            Arc::clone(&fallback) as Arc<dyn Notifier>,
        )
        .with_email(Arc::clone(&email) as Arc<dyn Notifier>);

        assert!(notifier.notify(event()).await.is_ok());
        assert_eq!(fallback.delivered.load(Ordering::SeqCst), 1);
        assert_eq!(email.delivered.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn one_delivered_channel_masks_a_failing_one() {
        let settings = Settings {
            email_notifications_enabled: true,
            webhook_notifications_enabled: true,
            ..Settings::default()
        };
        let fallback = Arc::new(CountingNotifier::default());
        let email = Arc::new(CountingNotifier {
            delivered: AtomicUsize::new(0),
            failing: true,
        });
        let webhook = Arc::new(CountingNotifier::default());
        let notifier = RoutingNotifier::new(
            Arc::new(StaticSettings(settings)),
            Arc::clone(&fallback) as Arc<dyn Notifier>,
        )
        .with_email(email as Arc<dyn Notifier>)
        .with_webhook(Arc::clone(&webhook) as Arc<dyn Notifier>);

        assert!(notifier.notify(event()).await.is_ok());
        assert_eq!(webhook.delivered.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.delivered.load(Ordering::SeqCst), 0);
    }
}
