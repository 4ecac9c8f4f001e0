use thiserror::Error;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Infrastructure errors for queue operations
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    /// The active backend cannot accept the job. The caller must surface this,
    /// the job has not been stored anywhere.
    #[error("Queue backend unavailable: {0}")]
    BackendUnavailable(String),

    /// No queue could be started by the worker process
    #[error("Startup failure: {0}")]
    StartupFailure(String),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Idempotency store error: {0}")]
    Idempotency(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl QueueError {
    /// Check if this error means the backend could not take the job
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}

/// Job processor outcome - determines retry behavior
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Retryable error - will schedule retry if attempts remain
    #[error("Retryable error: {0}")]
    Retryable(String),

    /// Permanent error - fail immediately, no retry
    #[error("Permanent error: {0}")]
    Permanent(String),
}

impl JobError {
    /// Create a retryable error
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::Retryable(msg.into())
    }

    /// Create a permanent error
    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(msg) | Self::Permanent(msg) => msg,
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        Self::Broker(err.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        Self::Idempotency(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_error_classification() {
        let retry = JobError::retryable("pms timeout");
        let fatal = JobError::permanent("bad payload");

        assert!(retry.is_retryable());
        assert!(!fatal.is_retryable());
        assert_eq!(retry.message(), "pms timeout");
        assert_eq!(fatal.to_string(), "Permanent error: bad payload");
    }

    #[test]
    fn test_unavailable_detection() {
        assert!(QueueError::BackendUnavailable("closed".into()).is_unavailable());
        assert!(!QueueError::Broker("reset".into()).is_unavailable());
    }
}
