//! Infrastructure adapters for the lifecycle ports.

#![forbid(unsafe_code)]

mod console_notifier;
mod http_access_provider;
mod in_memory_execution_store;
mod in_memory_request_store;
mod postgres_dead_letter_sink;
mod postgres_execution_store;
mod postgres_request_repository;
mod postgres_session_repository;
mod postgres_settings_repository;
mod redis_worker_lease_coordinator;
mod routing_notifier;
mod smtp_notifier;
mod webhook_notifier;

pub use console_notifier::ConsoleNotifier;
pub use http_access_provider::{HttpAccessProvider, HttpAccessProviderConfig};
pub use in_memory_execution_store::InMemoryExecutionStore;
pub use in_memory_request_store::InMemoryRequestStore;
pub use postgres_dead_letter_sink::PostgresDeadLetterSink;
pub use postgres_execution_store::PostgresExecutionStore;
pub use postgres_request_repository::PostgresRequestRepository;
pub use postgres_session_repository::PostgresSessionRepository;
pub use postgres_settings_repository::PostgresSettingsRepository;
pub use redis_worker_lease_coordinator::RedisWorkerLeaseCoordinator;
pub use routing_notifier::RoutingNotifier;
pub use smtp_notifier::{SmtpNotifier, SmtpNotifierConfig};
pub use webhook_notifier::WebhookNotifier;
