//! Idempotency guard: decides whether a job's natural key was already applied.
//!
//! A claim is atomic. Two concurrent `claim` calls for the same `(scope, key)`
//! can never both return [`Claim::Claimed`]. A successful side effect is then
//! recorded with `complete`; a failed one gives the key back with `release` so
//! a redelivery can try again.
//!
//! Use [`MemoryIdempotencyStore`] only inside one process. Consumers of the
//! durable queue may run in several processes, so production deployments back
//! the guard with Redis or a unique constraint in Postgres.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryIdempotencyStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisIdempotencyStore;
#[cfg(feature = "postgres")]
pub use postgres::PgIdempotencyStore;

use async_trait::async_trait;
use std::time::Duration;

use crate::QueueResult;

/// How long an unfinished claim blocks other deliveries before it is considered abandoned
pub const DEFAULT_CLAIM_TTL: Duration = Duration::from_secs(15 * 60);

/// Outcome of a claim attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The caller owns the key and may perform side effects
    Claimed,
    /// The side effect for this key has already happened
    Applied,
    /// Another delivery holds the key and has not finished yet
    InFlight,
}

#[async_trait]
pub trait IdempotencyGuard: Send + Sync {
    /// Atomically claim `key` within `scope`
    async fn claim(&self, scope: &str, key: &str) -> QueueResult<Claim>;

    /// Mark a claimed key as applied
    async fn complete(&self, scope: &str, key: &str) -> QueueResult<()>;

    /// Drop an unfinished claim so the key can be claimed again
    async fn release(&self, scope: &str, key: &str) -> QueueResult<()>;
}
