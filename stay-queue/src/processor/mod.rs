pub mod guarded;

pub use guarded::GuardedProcessor;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use crate::{Job, JobError};

/// Callback supplied by the application for one kind of job.
///
/// The queue core never looks inside the payload. Implementations must be safe
/// to invoke more than once for the same job: the durable backend delivers at
/// least once.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job: &Job) -> Result<(), JobError>;
}

/// Adapts a closure returning a boxed future into a [`JobProcessor`]
pub struct FnProcessor<F> {
    f: F,
}

impl<F> FnProcessor<F>
where
    F: Fn(Job) -> BoxFuture<'static, Result<(), JobError>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> JobProcessor for FnProcessor<F>
where
    F: Fn(Job) -> BoxFuture<'static, Result<(), JobError>> + Send + Sync,
{
    async fn process(&self, job: &Job) -> Result<(), JobError> {
        (self.f)(job.clone()).await
    }
}

/// Invoke a processor with a deadline and panic isolation.
///
/// Timeouts are retryable, panics are permanent. Either way the caller's
/// drain or consume loop keeps running.
pub async fn run_guarded(
    processor: &dyn JobProcessor,
    job: &Job,
    limit: Duration,
) -> Result<(), JobError> {
    let invocation = AssertUnwindSafe(processor.process(job)).catch_unwind();

    match tokio::time::timeout(limit, invocation).await {
        Err(_) => Err(JobError::retryable(format!(
            "processor timed out after {}ms",
            limit.as_millis()
        ))),
        Ok(Err(panic)) => Err(JobError::permanent(format!(
            "processor panicked: {}",
            panic_message(panic.as_ref())
        ))),
        Ok(Ok(outcome)) => outcome,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{JobKind, NewJob};
    use serde_json::json;

    fn job() -> Job {
        Job::accept(NewJob::new(JobKind::Webhook, json!({ "webhookId": "evt_1" })))
    }

    struct Panics;

    #[async_trait]
    impl JobProcessor for Panics {
        async fn process(&self, _job: &Job) -> Result<(), JobError> {
            panic!("pms client exploded");
        }
    }

    struct Hangs;

    #[async_trait]
    impl JobProcessor for Hangs {
        async fn process(&self, _job: &Job) -> Result<(), JobError> {
            futures::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_closure_processor_sees_payload() {
        let processor = FnProcessor::new(|job: Job| {
            async move {
                if job.payload["webhookId"] == "evt_1" {
                    Ok(())
                } else {
                    Err(JobError::permanent("wrong payload"))
                }
            }
            .boxed()
        });

        assert!(run_guarded(&processor, &job(), Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_panic_becomes_permanent_error() {
        let result = run_guarded(&Panics, &job(), Duration::from_secs(1)).await;

        match result {
            Err(JobError::Permanent(msg)) => assert!(msg.contains("pms client exploded")),
            other => panic!("expected permanent error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_hung_processor_times_out_as_retryable() {
        let result = run_guarded(&Hangs, &job(), Duration::from_millis(20)).await;

        assert!(matches!(result, Err(JobError::Retryable(_))));
    }
}
