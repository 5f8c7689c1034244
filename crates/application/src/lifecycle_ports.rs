mod access;
mod dead_letter;
mod execution;
mod lease;
mod notify;
mod session;
mod settings;
mod store;

pub use access::{AccessProvider, AccessProviderError, Assignment};
pub use dead_letter::{DeadLetterEntry, DeadLetterSink};
pub use execution::{
    ExecutionCheckpoint, ExecutionStatus, ExecutionStore, NewWorkflowExecution, WorkflowExecution,
    WorkflowInput, WorkflowKind,
};
pub use lease::{WorkerLease, WorkerLeaseCoordinator};
pub use notify::{NotificationEvent, NotificationKind, Notifier};
pub use session::SessionRepository;
pub use settings::SettingsProvider;
pub use store::{
    RequestChangeEvent, RequestChangeFeed, RequestPage, RequestRepository, StatusUpdater,
};
