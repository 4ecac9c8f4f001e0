use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use stay_queue::{JobError, QueueError, QueueResult};

use crate::jobs::BookingJob;
use crate::processors::{BookingHandler, WebhookHandler};

/// Delivers jobs to the application's internal processing endpoints over HTTP
#[derive(Clone)]
pub struct HttpCallbacks {
    client: Client,
    base_url: String,
}

impl HttpCallbacks {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> QueueResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QueueError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn webhook_url(&self, webhook_id: &str) -> String {
        format!(
            "{}/internal/jobs/webhooks/{}",
            self.base_url,
            urlencoding::encode(webhook_id)
        )
    }

    pub fn booking_url(&self) -> String {
        format!("{}/internal/jobs/bookings", self.base_url)
    }
}

/// Map an endpoint response to a job outcome.
///
/// 409 means the application already holds the record and counts as done.
pub fn classify(status: StatusCode, body: &str) -> Result<(), JobError> {
    if status.is_success() || status == StatusCode::CONFLICT {
        return Ok(());
    }

    let message = format!("callback returned {}: {}", status, body.trim());
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT {
        Err(JobError::retryable(message))
    } else {
        Err(JobError::permanent(message))
    }
}

async fn settle(response: Result<reqwest::Response, reqwest::Error>) -> Result<(), JobError> {
    let response = response.map_err(|e| JobError::retryable(format!("callback request failed: {}", e)))?;
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    classify(status, &body)
}

#[async_trait]
impl WebhookHandler for HttpCallbacks {
    async fn apply_webhook(&self, webhook_id: &str) -> Result<(), JobError> {
        let url = self.webhook_url(webhook_id);
        debug!(%url, "Posting webhook callback");
        settle(self.client.post(&url).send().await).await
    }
}

#[async_trait]
impl BookingHandler for HttpCallbacks {
    async fn create_booking(&self, booking: &BookingJob) -> Result<(), JobError> {
        let url = self.booking_url();
        debug!(%url, "Posting booking callback");
        settle(self.client.post(&url).json(booking).send().await).await
    }
}
