use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::JobProcessor;
use crate::idempotency::{Claim, IdempotencyGuard};
use crate::{Job, JobError};

/// Wraps a processor so jobs sharing an idempotency key cause one side effect.
///
/// Jobs without a key are passed through untouched.
pub struct GuardedProcessor<P> {
    scope: String,
    inner: P,
    guard: Arc<dyn IdempotencyGuard>,
    duplicates: AtomicU64,
}

impl<P: JobProcessor> GuardedProcessor<P> {
    pub fn new(scope: impl Into<String>, inner: P, guard: Arc<dyn IdempotencyGuard>) -> Self {
        Self {
            scope: scope.into(),
            inner,
            guard,
            duplicates: AtomicU64::new(0),
        }
    }

    /// Number of deliveries skipped as duplicates
    pub fn duplicates(&self) -> u64 {
        self.duplicates.load(Ordering::Relaxed)
    }
}

/// Hands the key back if the processing future is dropped before it settles.
///
/// A timeout or panic drops the future mid-await, so the release has to run on its own task.
struct ClaimRelease {
    guard: Arc<dyn IdempotencyGuard>,
    scope: String,
    key: String,
    armed: bool,
}

impl ClaimRelease {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ClaimRelease {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(scope = %self.scope, key = %self.key, "No runtime to release abandoned claim");
            return;
        };
        let guard = self.guard.clone();
        let scope = std::mem::take(&mut self.scope);
        let key = std::mem::take(&mut self.key);
        handle.spawn(async move {
            match guard.release(&scope, &key).await {
                Ok(()) => debug!(scope = %scope, key = %key, "Released claim of abandoned delivery"),
                Err(e) => warn!(scope = %scope, key = %key, error = %e, "Failed to release abandoned claim"),
            }
        });
    }
}

#[async_trait]
impl<P: JobProcessor> JobProcessor for GuardedProcessor<P> {
    async fn process(&self, job: &Job) -> Result<(), JobError> {
        let Some(key) = job.idempotency_key.as_deref() else {
            return self.inner.process(job).await;
        };

        let claim = self
            .guard
            .claim(&self.scope, key)
            .await
            .map_err(|e| JobError::retryable(format!("idempotency claim failed: {}", e)))?;

        match claim {
            Claim::Claimed => {}
            Claim::Applied => {
                self.duplicates.fetch_add(1, Ordering::Relaxed);
                debug!(scope = %self.scope, job_id = %job.id, key, "Duplicate delivery skipped");
                return Ok(());
            }
            Claim::InFlight => {
                debug!(scope = %self.scope, job_id = %job.id, key, "Key held by another delivery");
                return Err(JobError::retryable(format!(
                    "idempotency key {} is being applied by another delivery",
                    key
                )));
            }
        }

        let mut pending = ClaimRelease {
            guard: self.guard.clone(),
            scope: self.scope.clone(),
            key: key.to_string(),
            armed: true,
        };
        let outcome = self.inner.process(job).await;
        pending.disarm();

        match outcome {
            Ok(()) => {
                // The side effect already happened; a failed mark only risks a later duplicate check miss
                if let Err(e) = self.guard.complete(&self.scope, key).await {
                    warn!(scope = %self.scope, job_id = %job.id, key, error = %e, "Failed to mark key as applied");
                }
                Ok(())
            }
            Err(job_error) => {
                if let Err(e) = self.guard.release(&self.scope, key).await {
                    warn!(scope = %self.scope, job_id = %job.id, key, error = %e, "Failed to release idempotency claim");
                }
                Err(job_error)
            }
        }
    }
}
