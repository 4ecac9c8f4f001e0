use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::JobId;

/// Which backend a queue is running on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Single-process fallback, nothing survives a restart
    InProcess,
    /// Broker-backed, persistent, with retry and dead letters
    Durable,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProcess => f.write_str("in_process"),
            Self::Durable => f.write_str("durable"),
        }
    }
}

/// Proof of acceptance returned by `enqueue`.
///
/// A receipt does not mean the job ran, only that a backend owns it now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub job_id: JobId,
    pub queue: String,
    pub backend: BackendKind,
    pub accepted_at: DateTime<Utc>,
}
