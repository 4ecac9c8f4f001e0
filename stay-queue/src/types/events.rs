use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobId, JobKind};

/// Lifecycle events emitted by both backends for observability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent {
    Enqueued {
        job_id: JobId,
        queue: String,
        kind: JobKind,
        at: DateTime<Utc>,
    },

    /// A processor invocation is about to start
    Started {
        job_id: JobId,
        queue: String,
        attempt: u32,
        at: DateTime<Utc>,
    },

    Completed {
        job_id: JobId,
        queue: String,
        at: DateTime<Utc>,
    },

    /// Durable backend only: the job went back to the broker for redelivery
    Retrying {
        job_id: JobId,
        queue: String,
        attempt: u32,
        retry_at: DateTime<Utc>,
        error: String,
        at: DateTime<Utc>,
    },

    /// Durable backend only: retry budget exhausted or permanent failure
    DeadLettered {
        job_id: JobId,
        queue: String,
        attempt: u32,
        error: String,
        at: DateTime<Utc>,
    },

    /// In-process backend only: one failed attempt and the job is gone
    Dropped {
        job_id: JobId,
        queue: String,
        error: String,
        at: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Enqueued { .. } => "enqueued",
            Self::Started { .. } => "started",
            Self::Completed { .. } => "completed",
            Self::Retrying { .. } => "retrying",
            Self::DeadLettered { .. } => "dead_lettered",
            Self::Dropped { .. } => "dropped",
        }
    }

    /// Get the job ID from any event
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Enqueued { job_id, .. }
            | Self::Started { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Retrying { job_id, .. }
            | Self::DeadLettered { job_id, .. }
            | Self::Dropped { job_id, .. } => job_id,
        }
    }

    /// True once the job will not be processed again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::DeadLettered { .. } | Self::Dropped { .. }
        )
    }
}
