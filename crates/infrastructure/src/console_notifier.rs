//! Console notifier for development. Logs notifications to tracing output.

use async_trait::async_trait;
use elevate_application::{NotificationEvent, Notifier};
use elevate_core::AppResult;
use tracing::info;

/// Development notifier that logs notifications to the console.
#[derive(Clone)]
pub struct ConsoleNotifier;

impl ConsoleNotifier {
    /// Creates a new console notifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConsoleNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn notify(&self, event: NotificationEvent) -> AppResult<()> {
        let recipients = event.recipients().join(", ");
        info!(
            notification = event.kind.as_str(),
            request_id = %event.request.id,
            account = event.request.account_name.as_str(),
            role = event.request.role.as_str(),
            recipients = recipients.as_str(),
            "--- NOTIFICATION (console) ---"
        );

        Ok(())
    }
}
