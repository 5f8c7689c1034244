//! Lifecycle orchestration: ports, workflow machines, dispatcher, engine.

#![forbid(unsafe_code)]

/// Ports consumed by the lifecycle core.
pub mod lifecycle_ports;
pub mod machines;

mod lifecycle_service;

pub use lifecycle_ports::{
    AccessProvider, AccessProviderError, Assignment, DeadLetterEntry, DeadLetterSink,
    ExecutionCheckpoint, ExecutionStatus, ExecutionStore, NewWorkflowExecution, NotificationEvent,
    NotificationKind, Notifier, RequestChangeEvent, RequestChangeFeed, RequestPage,
    RequestRepository, SessionRepository, SettingsProvider, StatusUpdater, WorkerLease,
    WorkerLeaseCoordinator, WorkflowExecution, WorkflowInput, WorkflowKind,
};
pub use lifecycle_service::{
    DispatchSummary, LifecycleService, RetryPolicy, classify, dispatch_execution_key,
};
pub use machines::{Effect, EffectOutcome, MachineState};
