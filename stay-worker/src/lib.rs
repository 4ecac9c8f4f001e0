//! # stay-worker
//!
//! The worker process: reads configuration from the environment, starts the
//! webhook and booking queues, and keeps them running until a termination
//! signal arrives. Jobs are handed back to the application through its
//! internal HTTP endpoints.

pub mod callbacks;
pub mod config;
pub mod jobs;
pub mod lifecycle;
pub mod processors;
pub mod telemetry;

pub use callbacks::HttpCallbacks;
pub use config::{IdempotencyBackend, LogFormat, WorkerConfig};
pub use jobs::{BookingJob, WebhookJob};
pub use lifecycle::{shutdown_signal, QueueSpec, Worker, WorkerState};
pub use processors::{BookingHandler, BookingProcessor, WebhookHandler, WebhookProcessor};

use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

use stay_queue::{
    GuardedProcessor, IdempotencyGuard, JobKind, MemoryIdempotencyStore, QueueResult, QueueSettings,
};

/// Build the idempotency store the configuration asks for.
///
/// A store that cannot be reached degrades to the in-memory one, which only
/// deduplicates within this process.
pub async fn idempotency_guard(backend: &IdempotencyBackend, settings: &QueueSettings) -> Arc<dyn IdempotencyGuard> {
    match backend {
        IdempotencyBackend::Memory => Arc::new(MemoryIdempotencyStore::new()),

        #[cfg(feature = "redis")]
        IdempotencyBackend::Redis => {
            match stay_queue::RedisIdempotencyStore::connect(&settings.broker_url, settings.key_prefix.clone()).await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    warn!(error = %e, "Redis idempotency store unavailable, using in-memory store");
                    Arc::new(MemoryIdempotencyStore::new())
                }
            }
        }

        #[cfg(feature = "postgres")]
        IdempotencyBackend::Postgres { database_url } => {
            let connected = async {
                let store = stay_queue::PgIdempotencyStore::connect(database_url).await?;
                store.ensure_schema().await?;
                QueueResult::Ok(store)
            };
            match connected.await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    warn!(error = %e, "Postgres idempotency store unavailable, using in-memory store");
                    Arc::new(MemoryIdempotencyStore::new())
                }
            }
        }

        #[allow(unreachable_patterns)]
        other => {
            let _ = settings;
            warn!(store = ?other, "Idempotency store not compiled in, using in-memory store");
            Arc::new(MemoryIdempotencyStore::new())
        }
    }
}

/// Queue specs for the configured job kinds, each processor behind the guard
pub fn queue_specs(
    kinds: &[JobKind],
    callbacks: &HttpCallbacks,
    guard: Arc<dyn IdempotencyGuard>,
) -> Vec<QueueSpec> {
    kinds
        .iter()
        .map(|kind| {
            let scope = kind.queue_name();
            match kind {
                JobKind::Webhook => QueueSpec::new(
                    scope,
                    Arc::new(GuardedProcessor::new(
                        scope,
                        WebhookProcessor::new(Arc::new(callbacks.clone())),
                        guard.clone(),
                    )),
                ),
                JobKind::BookingCreation => QueueSpec::new(
                    scope,
                    Arc::new(GuardedProcessor::new(
                        scope,
                        BookingProcessor::new(Arc::new(callbacks.clone())),
                        guard.clone(),
                    )),
                ),
            }
        })
        .collect()
}

/// Start the configured queues and run until `shutdown` resolves
pub async fn run(config: WorkerConfig, shutdown: impl Future<Output = ()>) -> QueueResult<()> {
    info!(
        queues = ?config.kinds.iter().map(JobKind::queue_name).collect::<Vec<_>>(),
        durable = config.queue.use_durable,
        callback_url = %config.callback_url,
        "Starting worker"
    );

    let callbacks = HttpCallbacks::new(&config.callback_url, config.callback_timeout)?;
    let guard = idempotency_guard(&config.idempotency, &config.queue).await;
    let specs = queue_specs(&config.kinds, &callbacks, guard);

    let worker = Worker::start(specs, &config.queue).await?;
    worker.run_until(shutdown).await;
    Ok(())
}
