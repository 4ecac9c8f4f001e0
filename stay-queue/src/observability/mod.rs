pub mod metrics;

pub use metrics::{LiveMetrics, MetricsSnapshot};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::{Job, JobEvent};

const EVENT_CAPACITY: usize = 1024;

/// Per-queue event broadcaster and counters shared by a backend and its handle
#[derive(Clone)]
pub struct Telemetry {
    queue: String,
    events: broadcast::Sender<JobEvent>,
    metrics: Arc<LiveMetrics>,
}

impl Telemetry {
    pub fn new(queue: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            queue: queue.into(),
            events,
            metrics: Arc::new(LiveMetrics::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub fn metrics(&self) -> &LiveMetrics {
        &self.metrics
    }

    pub(crate) fn enqueued(&self, job: &Job) {
        self.metrics.record_enqueued();
        self.emit(JobEvent::Enqueued {
            job_id: job.id.clone(),
            queue: self.queue.clone(),
            kind: job.kind,
            at: Utc::now(),
        });
    }

    pub(crate) fn started(&self, job: &Job) {
        self.emit(JobEvent::Started {
            job_id: job.id.clone(),
            queue: self.queue.clone(),
            attempt: job.attempt_count,
            at: Utc::now(),
        });
    }

    pub(crate) fn completed(&self, job: &Job) {
        self.metrics.record_completed();
        self.emit(JobEvent::Completed {
            job_id: job.id.clone(),
            queue: self.queue.clone(),
            at: Utc::now(),
        });
    }

    pub(crate) fn retrying(&self, job: &Job, retry_at: DateTime<Utc>, error: &str) {
        self.metrics.record_failed();
        self.metrics.record_retried();
        self.emit(JobEvent::Retrying {
            job_id: job.id.clone(),
            queue: self.queue.clone(),
            attempt: job.attempt_count,
            retry_at,
            error: error.to_string(),
            at: Utc::now(),
        });
    }

    pub(crate) fn dead_lettered(&self, job: &Job, error: &str) {
        self.metrics.record_failed();
        self.metrics.record_dead_lettered();
        self.emit(JobEvent::DeadLettered {
            job_id: job.id.clone(),
            queue: self.queue.clone(),
            attempt: job.attempt_count,
            error: error.to_string(),
            at: Utc::now(),
        });
    }

    pub(crate) fn dropped(&self, job: &Job, error: &str) {
        self.metrics.record_failed();
        self.metrics.record_dropped();
        self.emit(JobEvent::Dropped {
            job_id: job.id.clone(),
            queue: self.queue.clone(),
            error: error.to_string(),
            at: Utc::now(),
        });
    }

    fn emit(&self, event: JobEvent) {
        // No subscribers is the normal case outside tests
        let _ = self.events.send(event);
    }
}
