//! Elevate lifecycle worker runtime.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use elevate_application::{
    AccessProvider, DeadLetterSink, ExecutionStore, LifecycleService, Notifier,
    RequestChangeFeed, RequestRepository, SessionRepository, SettingsProvider, StatusUpdater,
    WorkerLeaseCoordinator,
};
use elevate_core::{AppError, AppResult};
use elevate_infrastructure::{
    ConsoleNotifier, HttpAccessProvider, HttpAccessProviderConfig, PostgresDeadLetterSink,
    PostgresExecutionStore, PostgresRequestRepository, PostgresSessionRepository,
    PostgresSettingsRepository, RedisWorkerLeaseCoordinator, RoutingNotifier, SmtpNotifier,
    SmtpNotifierConfig, WebhookNotifier,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const FEED_LEASE_SCOPE: &str = "request-change-feed";

#[derive(Debug, Clone)]
struct WorkerConfig {
    database_url: String,
    redis_url: Option<String>,
    worker_id: String,
    claim_limit: usize,
    feed_batch_limit: usize,
    lease_seconds: u32,
    poll_interval_ms: u64,
    access_provider_url: String,
    access_provider_instance_id: String,
    access_provider_token: String,
    smtp: Option<SmtpNotifierConfig>,
    webhook_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;
    let service = build_lifecycle_service(pool, &config)?;
    let lease_coordinator = build_lease_coordinator(&config)?;

    info!(
        worker_id = %config.worker_id,
        claim_limit = config.claim_limit,
        feed_batch_limit = config.feed_batch_limit,
        lease_seconds = config.lease_seconds,
        poll_interval_ms = config.poll_interval_ms,
        "elevate-worker started"
    );

    loop {
        let now = Utc::now();

        match dispatch_feed(&service, &lease_coordinator, &config).await {
            Ok(Some(summary)) => {
                if summary.started > 0 || summary.dead_lettered > 0 {
                    info!(
                        worker_id = %config.worker_id,
                        started = summary.started,
                        ignored = summary.ignored,
                        suppressed = summary.suppressed,
                        released = summary.released,
                        dead_lettered = summary.dead_lettered,
                        "change events dispatched"
                    );
                }
            }
            Ok(None) => {}
            Err(dispatch_error) => {
                warn!(
                    worker_id = %config.worker_id,
                    error = %dispatch_error,
                    "failed to dispatch change events"
                );
            }
        }

        match service
            .run_due(
                config.worker_id.as_str(),
                now,
                config.claim_limit,
                config.lease_seconds,
            )
            .await
        {
            Ok(finished) => {
                if !finished.is_empty() {
                    info!(
                        worker_id = %config.worker_id,
                        ran = finished.len(),
                        "executions advanced"
                    );
                }
            }
            Err(run_error) => {
                warn!(
                    worker_id = %config.worker_id,
                    error = %run_error,
                    "failed to run due executions"
                );
            }
        }

        tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)).await;
    }
}

/// Polls the change feed under an exclusive lease when Redis coordination
/// is configured; returns `None` when another worker holds the lease.
async fn dispatch_feed(
    service: &LifecycleService,
    lease_coordinator: &Option<RedisWorkerLeaseCoordinator>,
    config: &WorkerConfig,
) -> AppResult<Option<elevate_application::DispatchSummary>> {
    let Some(coordinator) = lease_coordinator else {
        let summary = service
            .poll_and_dispatch(config.feed_batch_limit, Utc::now())
            .await?;
        return Ok(Some(summary));
    };

    let Some(lease) = coordinator
        .try_acquire_lease(
            FEED_LEASE_SCOPE,
            config.worker_id.as_str(),
            config.lease_seconds,
        )
        .await?
    else {
        return Ok(None);
    };

    let result = service
        .poll_and_dispatch(config.feed_batch_limit, Utc::now())
        .await;

    if let Err(release_error) = coordinator.release_lease(&lease).await {
        warn!(
            worker_id = %config.worker_id,
            error = %release_error,
            "failed to release change feed lease"
        );
    }

    result.map(Some)
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

fn build_lifecycle_service(pool: PgPool, config: &WorkerConfig) -> AppResult<LifecycleService> {
    let repository = Arc::new(PostgresRequestRepository::new(pool.clone()));
    let execution_store = Arc::new(PostgresExecutionStore::new(pool.clone()));
    let session_repository = Arc::new(PostgresSessionRepository::new(pool.clone()));
    let settings_provider = Arc::new(PostgresSettingsRepository::new(pool.clone()));
    let dead_letter_sink = Arc::new(PostgresDeadLetterSink::new(pool));

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;

    let access_provider = Arc::new(HttpAccessProvider::new(
        http_client.clone(),
        HttpAccessProviderConfig {
            base_url: config.access_provider_url.clone(),
            instance_id: config.access_provider_instance_id.clone(),
            api_token: config.access_provider_token.clone(),
        },
    ));

    let mut notifier = RoutingNotifier::new(
        Arc::clone(&settings_provider) as Arc<dyn SettingsProvider>,
        Arc::new(ConsoleNotifier::new()) as Arc<dyn Notifier>,
    );
    if let Some(smtp) = &config.smtp {
        notifier = notifier.with_email(Arc::new(SmtpNotifier::new(smtp.clone())));
    }
    if let Some(webhook_url) = &config.webhook_url {
        notifier = notifier.with_webhook(Arc::new(WebhookNotifier::new(
            http_client,
            webhook_url.clone(),
        )));
    }

    Ok(LifecycleService::new(
        Arc::clone(&repository) as Arc<dyn RequestRepository>,
        Arc::clone(&repository) as Arc<dyn RequestChangeFeed>,
        access_provider as Arc<dyn AccessProvider>,
        Arc::new(notifier) as Arc<dyn Notifier>,
        repository as Arc<dyn StatusUpdater>,
        execution_store as Arc<dyn ExecutionStore>,
        session_repository as Arc<dyn SessionRepository>,
        settings_provider as Arc<dyn SettingsProvider>,
        dead_letter_sink as Arc<dyn DeadLetterSink>,
    ))
}

fn build_lease_coordinator(
    config: &WorkerConfig,
) -> AppResult<Option<RedisWorkerLeaseCoordinator>> {
    let Some(redis_url) = &config.redis_url else {
        return Ok(None);
    };

    let client = redis::Client::open(redis_url.as_str())
        .map_err(|error| AppError::Internal(format!("failed to build redis client: {error}")))?;
    Ok(Some(RedisWorkerLeaseCoordinator::new(
        client,
        "elevate:lease",
    )))
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let redis_url = optional_env("REDIS_URL");
        let worker_id = optional_env("WORKER_ID")
            .unwrap_or_else(|| format!("worker-{}", std::process::id()));
        let claim_limit = parse_env_usize("WORKER_CLAIM_LIMIT", 10)?;
        let feed_batch_limit = parse_env_usize("WORKER_FEED_BATCH_LIMIT", 25)?;
        let lease_seconds = parse_env_u32("WORKER_LEASE_SECONDS", 30)?;
        let poll_interval_ms = parse_env_u64("WORKER_POLL_INTERVAL_MS", 1500)?;

        let access_provider_url = required_env("ACCESS_PROVIDER_URL")?;
        let access_provider_instance_id = required_env("ACCESS_PROVIDER_INSTANCE_ID")?;
        let access_provider_token = required_env("ACCESS_PROVIDER_TOKEN")?;

        let smtp = match optional_env("SMTP_HOST") {
            Some(host) => Some(SmtpNotifierConfig {
                host,
                port: parse_env_u16("SMTP_PORT", 587)?,
                username: required_env("SMTP_USERNAME")?,
                password: required_env("SMTP_PASSWORD")?,
                from_address: required_env("SMTP_FROM_ADDRESS")?,
            }),
            None => None,
        };
        let webhook_url = optional_env("WEBHOOK_URL");

        if claim_limit == 0 {
            return Err(AppError::Validation(
                "WORKER_CLAIM_LIMIT must be greater than zero".to_owned(),
            ));
        }

        if feed_batch_limit == 0 {
            return Err(AppError::Validation(
                "WORKER_FEED_BATCH_LIMIT must be greater than zero".to_owned(),
            ));
        }

        if lease_seconds == 0 {
            return Err(AppError::Validation(
                "WORKER_LEASE_SECONDS must be greater than zero".to_owned(),
            ));
        }

        if poll_interval_ms == 0 {
            return Err(AppError::Validation(
                "WORKER_POLL_INTERVAL_MS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            redis_url,
            worker_id,
            claim_limit,
            feed_batch_limit,
            lease_seconds,
            poll_interval_ms,
            access_provider_url,
            access_provider_instance_id,
            access_provider_token,
            smtp,
            webhook_url,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_env_usize(name: &str, default: usize) -> AppResult<usize> {
    match env::var(name) {
        Ok(value) => value.parse::<usize>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u16(name: &str, default: u16) -> AppResult<u16> {
    match env::var(name) {
        Ok(value) => value.parse::<u16>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> AppResult<u32> {
    match env::var(name) {
        Ok(value) => value.parse::<u32>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
