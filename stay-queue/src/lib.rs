//! # stay-queue
//!
//! Background job core for the booking platform.
//!
//! Producers hand [`NewJob`]s to a [`JobQueue`] and get a [`Receipt`] back.
//! Which backend serves the queue is decided once at process start:
//!
//! - **Durable**: jobs live in a broker (Redis), survive restarts, are retried
//!   with exponential backoff and end in a dead-letter list when the budget
//!   runs out.
//! - **In-process**: the fallback when no broker is configured or reachable.
//!   Jobs run one at a time in enqueue order inside the current process, are
//!   never retried and are lost on restart.
//!
//! Delivery on the durable path is at-least-once, so processors that create
//! records should be wrapped in a [`GuardedProcessor`] with an
//! [`IdempotencyGuard`](idempotency::IdempotencyGuard).
//!
//! ```rust,ignore
//! use stay_queue::prelude::*;
//!
//! let settings = QueueSettings::from_env()?;
//! let queue = JobQueue::connect("webhooks", &settings, Arc::new(WebhookProcessor::new(handler))).await;
//! queue.start().await?;
//!
//! let receipt = queue
//!     .enqueue(NewJob::new(JobKind::Webhook, json!({ "webhookId": "evt_42" })))
//!     .await?;
//! ```

pub mod backend;
pub mod broker;
pub mod config;
pub mod error;
pub mod idempotency;
pub mod observability;
pub mod processor;
pub mod queue;
pub mod retry;
pub mod types;

pub use backend::{DurableQueue, InProcessQueue, QueueBackend};
pub use broker::{Broker, DeadLetter, MemoryBroker, QueueDepth, Reservation};
pub use config::QueueSettings;
pub use error::{JobError, QueueError, QueueResult};
pub use idempotency::{Claim, IdempotencyGuard, MemoryIdempotencyStore};
pub use observability::{LiveMetrics, MetricsSnapshot, Telemetry};
pub use processor::{run_guarded, FnProcessor, GuardedProcessor, JobProcessor};
pub use queue::JobQueue;
pub use retry::{BackoffStrategy, RetryPolicy};
pub use types::{BackendKind, Job, JobEvent, JobId, JobKind, NewJob, Receipt};

#[cfg(feature = "redis")]
pub use broker::RedisBroker;
#[cfg(feature = "redis")]
pub use idempotency::RedisIdempotencyStore;
#[cfg(feature = "postgres")]
pub use idempotency::PgIdempotencyStore;

pub mod prelude {
    pub use crate::{
        BackendKind, Job, JobError, JobEvent, JobKind, JobProcessor, JobQueue, NewJob, QueueError,
        QueueResult, QueueSettings, Receipt,
    };

    pub use crate::{GuardedProcessor, IdempotencyGuard, MemoryIdempotencyStore};

    pub use async_trait::async_trait;
}
