use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::{QueueError, QueueResult};

/// Per-process queue settings, fixed at startup
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSettings {
    /// Ask for the durable broker; falls back to in-process when it fails
    pub use_durable: bool,
    pub broker_url: String,
    pub key_prefix: String,

    /// Consumer tasks per durable queue
    pub consumers: usize,

    /// Upper bound for one processor invocation
    pub processor_timeout: Duration,

    /// How often the scheduler promotes due retries
    pub poll_interval: Duration,

    /// How long one consumer blocks waiting for work
    pub reserve_timeout: Duration,

    /// Return jobs stranded in processing to ready on startup.
    /// Only safe when a single worker process consumes the queue.
    pub recover_in_flight: bool,

    pub retry: RetryPolicy,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            use_durable: false,
            broker_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "stay".to_string(),
            consumers: 1,
            processor_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_millis(500),
            reserve_timeout: Duration::from_secs(1),
            recover_in_flight: true,
            retry: RetryPolicy::default(),
        }
    }
}

impl QueueSettings {
    /// Load from `QUEUE_*` environment variables, defaulting what is unset
    pub fn from_env() -> QueueResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> QueueResult<Self> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let retry = RetryPolicy {
            max_attempts: parse_or(&var, "QUEUE_MAX_ATTEMPTS", defaults.retry.max_attempts)?,
            base_delay: secs_or(&var, "QUEUE_BASE_RETRY_BACKOFF_SECS", defaults.retry.base_delay)?,
            max_delay: secs_or(&var, "QUEUE_MAX_RETRY_BACKOFF_SECS", defaults.retry.max_delay)?,
            jitter: millis_or(&var, "QUEUE_RETRY_JITTER_MS", defaults.retry.jitter)?,
            ..defaults.retry.clone()
        };
        if retry.max_attempts == 0 {
            return Err(QueueError::Config("QUEUE_MAX_ATTEMPTS must be at least 1".to_string()));
        }

        let consumers = parse_or(&var, "QUEUE_CONSUMERS", defaults.consumers)?;
        if consumers == 0 {
            return Err(QueueError::Config("QUEUE_CONSUMERS must be at least 1".to_string()));
        }

        let poll_interval = millis_or(&var, "QUEUE_POLL_INTERVAL_MS", defaults.poll_interval)?;
        if poll_interval.is_zero() {
            return Err(QueueError::Config("QUEUE_POLL_INTERVAL_MS must be positive".to_string()));
        }

        let processor_timeout = secs_or(&var, "QUEUE_PROCESSOR_TIMEOUT_SECS", defaults.processor_timeout)?;
        if processor_timeout.is_zero() {
            return Err(QueueError::Config("QUEUE_PROCESSOR_TIMEOUT_SECS must be positive".to_string()));
        }

        Ok(Self {
            use_durable: bool_or(&var, "QUEUE_USE_DURABLE", defaults.use_durable)?,
            broker_url: var("QUEUE_BROKER_URL").unwrap_or(defaults.broker_url),
            key_prefix: var("QUEUE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            consumers,
            processor_timeout,
            poll_interval,
            reserve_timeout: defaults.reserve_timeout,
            recover_in_flight: bool_or(&var, "QUEUE_RECOVER_IN_FLIGHT", defaults.recover_in_flight)?,
            retry,
        })
    }
}

fn parse_or<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> QueueResult<T> {
    match var(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| QueueError::Config(format!("{} has invalid value '{}'", key, raw))),
    }
}

fn secs_or(var: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> QueueResult<Duration> {
    parse_or(var, key, default.as_secs()).map(Duration::from_secs)
}

fn millis_or(var: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> QueueResult<Duration> {
    parse_or(var, key, default.as_millis() as u64).map(Duration::from_millis)
}

/// Parse a boolean flag, accepting `true/false`, `1/0` and `yes/no`
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn bool_or(var: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> QueueResult<bool> {
    match var(key) {
        None => Ok(default),
        Some(raw) => parse_flag(&raw)
            .ok_or_else(|| QueueError::Config(format!("{} has invalid value '{}'", key, raw))),
    }
}
