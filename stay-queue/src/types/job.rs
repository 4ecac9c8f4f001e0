use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::JobId;

/// The two kinds of asynchronous work the platform hands to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// PMS webhook ingestion, payload `{ webhookId }`
    Webhook,
    /// Booking creation request from the API layer
    BookingCreation,
}

impl JobKind {
    /// Default queue name for this kind of job
    pub fn queue_name(&self) -> &'static str {
        match self {
            Self::Webhook => "webhooks",
            Self::BookingCreation => "bookings",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webhook => "webhook",
            Self::BookingCreation => "booking_creation",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job submission as handed to `enqueue` by a producer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    pub kind: JobKind,

    /// Kind-specific payload, opaque to the queue core
    pub payload: Value,

    /// Natural key used to collapse duplicate deliveries
    pub idempotency_key: Option<String>,
}

impl NewJob {
    pub fn new(kind: JobKind, payload: Value) -> Self {
        Self {
            kind,
            payload,
            idempotency_key: None,
        }
    }

    /// Set the idempotency key
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// A unit of work owned by whichever backend accepted it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub payload: Value,
    pub idempotency_key: Option<String>,
    pub enqueued_at: DateTime<Utc>,

    /// Number of processor invocations so far, incremented before each one
    pub attempt_count: u32,
}

impl Job {
    /// Accept a submission, stamping identity and enqueue time
    pub fn accept(new_job: NewJob) -> Self {
        Self {
            id: JobId::new(),
            kind: new_job.kind,
            payload: new_job.payload,
            idempotency_key: new_job.idempotency_key,
            enqueued_at: Utc::now(),
            attempt_count: 0,
        }
    }

    /// Serialize for storage in a broker
    pub fn to_raw(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_raw(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}
