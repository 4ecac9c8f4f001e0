use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, instrument};

use stay_queue::{Job, JobError, JobProcessor};

use crate::jobs::{BookingJob, WebhookJob};

/// Application side of webhook ingestion
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    async fn apply_webhook(&self, webhook_id: &str) -> Result<(), JobError>;
}

/// Application side of booking creation
#[async_trait]
pub trait BookingHandler: Send + Sync {
    async fn create_booking(&self, booking: &BookingJob) -> Result<(), JobError>;
}

fn decode<T: DeserializeOwned>(job: &Job) -> Result<T, JobError> {
    serde_json::from_value(job.payload.clone())
        .map_err(|e| JobError::permanent(format!("malformed {} payload: {}", job.kind, e)))
}

pub struct WebhookProcessor {
    handler: Arc<dyn WebhookHandler>,
}

impl WebhookProcessor {
    pub fn new(handler: Arc<dyn WebhookHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl JobProcessor for WebhookProcessor {
    #[instrument(name = "process_webhook", skip_all, fields(job_id = %job.id, attempt = job.attempt_count))]
    async fn process(&self, job: &Job) -> Result<(), JobError> {
        let webhook: WebhookJob = decode(job)?;
        debug!(webhook_id = %webhook.webhook_id, "Applying webhook");
        self.handler.apply_webhook(&webhook.webhook_id).await
    }
}

pub struct BookingProcessor {
    handler: Arc<dyn BookingHandler>,
}

impl BookingProcessor {
    pub fn new(handler: Arc<dyn BookingHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl JobProcessor for BookingProcessor {
    #[instrument(name = "process_booking", skip_all, fields(job_id = %job.id, attempt = job.attempt_count))]
    async fn process(&self, job: &Job) -> Result<(), JobError> {
        let booking: BookingJob = decode(job)?;
        debug!(week_id = ?booking.week_id, user_id = ?booking.user_id, "Creating booking");
        self.handler.create_booking(&booking).await
    }
}
