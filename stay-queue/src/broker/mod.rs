pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::MemoryBroker;
#[cfg(feature = "redis")]
pub use self::redis::RedisBroker;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{Job, QueueResult};

/// A job moved to the processing list, with the exact stored form needed to ack it
#[derive(Debug, Clone)]
pub struct Reservation {
    pub job: Job,
    raw: String,
}

impl Reservation {
    pub fn new(job: Job, raw: String) -> Self {
        Self { job, raw }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// A job that exhausted its retry budget or failed permanently
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub job: Job,
    pub error: String,
    pub dead_at: DateTime<Utc>,
}

/// Sizes of the four per-queue collections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueDepth {
    pub ready: usize,
    pub processing: usize,
    pub delayed: usize,
    pub dead: usize,
}

/// Storage primitives for the durable backend.
///
/// Every job lives in exactly one of ready, processing, delayed or dead.
/// Moves between them must be atomic so a crash never loses or duplicates
/// a stored job.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Check the broker answers
    async fn ping(&self) -> QueueResult<()>;

    /// Append to the ready list (producer side)
    async fn push(&self, queue: &str, job: &Job) -> QueueResult<()>;

    /// Move the oldest ready job to processing, waiting up to `wait`
    async fn reserve(&self, queue: &str, wait: Duration) -> QueueResult<Option<Reservation>>;

    async fn ack(&self, queue: &str, reservation: &Reservation) -> QueueResult<()>;

    /// Replace the reserved entry with `job` in the delayed set, due at `at`
    async fn retry_at(
        &self,
        queue: &str,
        reservation: &Reservation,
        job: &Job,
        at: DateTime<Utc>,
    ) -> QueueResult<()>;

    async fn dead_letter(
        &self,
        queue: &str,
        reservation: &Reservation,
        letter: &DeadLetter,
    ) -> QueueResult<()>;

    /// Move delayed jobs due at or before `now` to ready, returning how many moved
    async fn promote_due(&self, queue: &str, now: DateTime<Utc>) -> QueueResult<usize>;

    /// Return jobs stranded in processing by a dead process to ready
    async fn recover_in_flight(&self, queue: &str) -> QueueResult<usize>;

    /// Most recent dead letters first
    async fn dead_letters(&self, queue: &str, limit: usize) -> QueueResult<Vec<DeadLetter>>;

    async fn depth(&self, queue: &str) -> QueueResult<QueueDepth>;
}
