use std::sync::Arc;

use chrono::{DateTime, Utc};
use elevate_core::{AppError, AppResult};
use elevate_domain::{Request, RequestPatch, RequestStatus, Session};
use tracing::{debug, error, info, warn};

use crate::lifecycle_ports::{
    AccessProvider, Assignment, DeadLetterEntry, DeadLetterSink, ExecutionCheckpoint,
    ExecutionStatus, ExecutionStore, NewWorkflowExecution, NotificationEvent, Notifier,
    RequestChangeEvent, RequestChangeFeed, RequestRepository, SessionRepository, SettingsProvider,
    StatusUpdater, WorkflowExecution, WorkflowInput, WorkflowKind,
};
use crate::machines::{Effect, EffectOutcome, MachineState};

mod dispatch;
mod engine;
mod retry;


pub use dispatch::{DispatchSummary, classify, dispatch_execution_key};
pub use retry::RetryPolicy;

/// Lifecycle orchestration service: dispatches change events into workflow
/// starts and drives durable executions through their machines.
#[derive(Clone)]
pub struct LifecycleService {
    repository: Arc<dyn RequestRepository>,
    change_feed: Arc<dyn RequestChangeFeed>,
    access_provider: Arc<dyn AccessProvider>,
    notifier: Arc<dyn Notifier>,
    status_updater: Arc<dyn StatusUpdater>,
    execution_store: Arc<dyn ExecutionStore>,
    session_repository: Arc<dyn SessionRepository>,
    settings_provider: Arc<dyn SettingsProvider>,
    dead_letter_sink: Arc<dyn DeadLetterSink>,
    invocation_retry: RetryPolicy,
    access_retry: RetryPolicy,
    session_ttl: chrono::Duration,
    max_dispatch_attempts: u32,
}

impl LifecycleService {
    /// Creates a lifecycle service with default retry policies.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repository: Arc<dyn RequestRepository>,
        change_feed: Arc<dyn RequestChangeFeed>,
        access_provider: Arc<dyn AccessProvider>,
        notifier: Arc<dyn Notifier>,
        status_updater: Arc<dyn StatusUpdater>,
        execution_store: Arc<dyn ExecutionStore>,
        session_repository: Arc<dyn SessionRepository>,
        settings_provider: Arc<dyn SettingsProvider>,
        dead_letter_sink: Arc<dyn DeadLetterSink>,
    ) -> Self {
        Self {
            repository,
            change_feed,
            access_provider,
            notifier,
            status_updater,
            execution_store,
            session_repository,
            settings_provider,
            dead_letter_sink,
            invocation_retry: RetryPolicy::invocation_default(),
            access_retry: RetryPolicy::access_default(),
            session_ttl: chrono::Duration::days(90),
            max_dispatch_attempts: 3,
        }
    }

    /// Overrides the retry policies for invocation and provider calls.
    #[must_use]
    pub fn with_retry_policies(mut self, invocation: RetryPolicy, access: RetryPolicy) -> Self {
        self.invocation_retry = invocation;
        self.access_retry = access;
        self
    }

    /// Overrides the hot-storage TTL of audit sessions.
    #[must_use]
    pub fn with_session_ttl_days(mut self, days: i64) -> Self {
        self.session_ttl = chrono::Duration::days(days);
        self
    }

    /// Overrides how many deliveries a change event gets before it is
    /// dead-lettered.
    #[must_use]
    pub fn with_max_dispatch_attempts(mut self, attempts: u32) -> Self {
        self.max_dispatch_attempts = attempts.max(1);
        self
    }
}
