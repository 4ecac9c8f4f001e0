use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::broker::{Broker, DeadLetter, Reservation};
use crate::observability::Telemetry;
use crate::processor::{run_guarded, JobProcessor};
use crate::retry::RetryPolicy;
use crate::{JobError, QueueResult};

pub(super) struct Consumer<B: Broker> {
    pub index: usize,
    pub queue: String,
    pub broker: Arc<B>,
    pub processor: Arc<dyn JobProcessor>,
    pub telemetry: Telemetry,
    pub retry: RetryPolicy,
    pub processor_timeout: Duration,
    pub reserve_timeout: Duration,
}

impl<B: Broker> Consumer<B> {
    /// Consume until the task is aborted. Broker errors never end the loop.
    pub async fn run(self) {
        debug!(queue = %self.queue, consumer = self.index, "Consumer running");

        loop {
            let reserved = match self.broker.reserve(&self.queue, self.reserve_timeout).await {
                Ok(reserved) => reserved,
                Err(e) => {
                    warn!(queue = %self.queue, consumer = self.index, error = %e, "Reserve failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            let Some(reservation) = reserved else {
                continue;
            };

            if let Err(e) = self.handle(reservation).await {
                error!(queue = %self.queue, consumer = self.index, error = %e, "Failed to record job outcome");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }

    async fn handle(&self, reservation: Reservation) -> QueueResult<()> {
        let mut job = reservation.job.clone();
        job.attempt_count += 1;

        self.telemetry.started(&job);
        debug!(queue = %self.queue, job_id = %job.id, attempt = job.attempt_count, "Processing job");

        let outcome = run_guarded(self.processor.as_ref(), &job, self.processor_timeout).await;

        let error = match outcome {
            Ok(()) => {
                self.broker.ack(&self.queue, &reservation).await?;
                self.telemetry.completed(&job);
                return Ok(());
            }
            Err(error) => error,
        };

        let retry_at = match &error {
            JobError::Retryable(_) => self.retry.next_retry(job.attempt_count, Utc::now()),
            JobError::Permanent(_) => None,
        };

        match retry_at {
            Some(at) => {
                self.broker.retry_at(&self.queue, &reservation, &job, at).await?;
                warn!(
                    queue = %self.queue,
                    job_id = %job.id,
                    attempt = job.attempt_count,
                    retry_at = %at,
                    error = %error,
                    "Job failed, will retry"
                );
                self.telemetry.retrying(&job, at, error.message());
            }
            None => {
                let letter = DeadLetter {
                    job: job.clone(),
                    error: error.message().to_string(),
                    dead_at: Utc::now(),
                };
                self.broker.dead_letter(&self.queue, &reservation, &letter).await?;
                error!(
                    queue = %self.queue,
                    job_id = %job.id,
                    kind = %job.kind,
                    attempt = job.attempt_count,
                    payload = %job.payload,
                    error = %error,
                    "Job dead-lettered"
                );
                self.telemetry.dead_lettered(&job, error.message());
            }
        }

        Ok(())
    }
}
