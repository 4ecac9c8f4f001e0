use std::env;
use std::time::Duration;

use stay_queue::{JobKind, QueueError, QueueResult, QueueSettings};

/// Output format of the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Read `WORKER_LOG_FORMAT` before the rest of the configuration, so
    /// configuration errors can already be logged
    pub fn from_env() -> Self {
        env::var("WORKER_LOG_FORMAT")
            .ok()
            .and_then(|raw| Self::parse(&raw))
            .unwrap_or_default()
    }
}

/// Where processed idempotency keys are recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyBackend {
    Memory,
    /// Shares the broker's Redis and key prefix
    Redis,
    Postgres { database_url: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub queue: QueueSettings,
    /// Kinds this worker runs a queue for, in start order
    pub kinds: Vec<JobKind>,
    pub log_format: LogFormat,
    pub idempotency: IdempotencyBackend,
    pub callback_url: String,
    pub callback_timeout: Duration,
}

impl WorkerConfig {
    /// Read the process environment
    pub fn from_env() -> QueueResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> QueueResult<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let queue = QueueSettings::from_lookup(&var)?;

        let kinds = match var("WORKER_QUEUES") {
            None => vec![JobKind::Webhook, JobKind::BookingCreation],
            Some(raw) => parse_kinds(&raw)?,
        };

        let log_format = match var("WORKER_LOG_FORMAT") {
            None => LogFormat::default(),
            Some(raw) => LogFormat::parse(&raw)
                .ok_or_else(|| QueueError::Config(format!("WORKER_LOG_FORMAT has invalid value '{}'", raw)))?,
        };

        let idempotency = match var("WORKER_IDEMPOTENCY_STORE").as_deref() {
            None if queue.use_durable => IdempotencyBackend::Redis,
            None | Some("memory") => IdempotencyBackend::Memory,
            Some("redis") => IdempotencyBackend::Redis,
            Some("postgres") => IdempotencyBackend::Postgres {
                database_url: var("DATABASE_URL").ok_or_else(|| {
                    QueueError::Config("DATABASE_URL is required for the postgres idempotency store".to_string())
                })?,
            },
            Some(other) => {
                return Err(QueueError::Config(format!(
                    "WORKER_IDEMPOTENCY_STORE has invalid value '{}'",
                    other
                )))
            }
        };

        let callback_timeout = match var("APP_CALLBACK_TIMEOUT_SECS") {
            None => Duration::from_secs(30),
            Some(raw) => raw.parse().map(Duration::from_secs).map_err(|_| {
                QueueError::Config(format!("APP_CALLBACK_TIMEOUT_SECS has invalid value '{}'", raw))
            })?,
        };

        Ok(Self {
            queue,
            kinds,
            log_format,
            idempotency,
            callback_url: var("APP_CALLBACK_URL")
                .unwrap_or_else(|| "http://127.0.0.1:3000".to_string())
                .trim_end_matches('/')
                .to_string(),
            callback_timeout,
        })
    }
}

fn parse_kinds(raw: &str) -> QueueResult<Vec<JobKind>> {
    let mut kinds = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|name| !name.is_empty()) {
        let kind = match name {
            "webhooks" => JobKind::Webhook,
            "bookings" => JobKind::BookingCreation,
            other => return Err(QueueError::Config(format!("WORKER_QUEUES names unknown queue '{}'", other))),
        };
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> QueueResult<WorkerConfig> {
        let vars: HashMap<&str, &str> = pairs.iter().copied().collect();
        WorkerConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults_run_both_queues_in_memory() {
        let config = config(&[]).unwrap();

        assert_eq!(config.kinds, vec![JobKind::Webhook, JobKind::BookingCreation]);
        assert_eq!(config.idempotency, IdempotencyBackend::Memory);
        assert_eq!(config.callback_url, "http://127.0.0.1:3000");
        assert_eq!(config.callback_timeout, Duration::from_secs(30));
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_durable_mode_defaults_to_redis_guard() {
        let config = config(&[("QUEUE_USE_DURABLE", "true"), ("WORKER_QUEUES", "bookings")]).unwrap();

        assert!(config.queue.use_durable);
        assert_eq!(config.kinds, vec![JobKind::BookingCreation]);
        assert_eq!(config.idempotency, IdempotencyBackend::Redis);
    }

    #[test]
    fn test_postgres_guard_needs_database_url() {
        assert!(config(&[("WORKER_IDEMPOTENCY_STORE", "postgres")]).is_err());

        let config = config(&[
            ("WORKER_IDEMPOTENCY_STORE", "postgres"),
            ("DATABASE_URL", "postgres://stay@db/stay"),
        ])
        .unwrap();
        assert_eq!(
            config.idempotency,
            IdempotencyBackend::Postgres {
                database_url: "postgres://stay@db/stay".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_queue_name_is_rejected() {
        assert!(matches!(
            config(&[("WORKER_QUEUES", "webhooks,payments")]),
            Err(QueueError::Config(_))
        ));
    }

    #[test]
    fn test_callback_url_trailing_slash_is_trimmed() {
        let config = config(&[("APP_CALLBACK_URL", "https://api.stay.test/"), ("WORKER_LOG_FORMAT", "json")]).unwrap();

        assert_eq!(config.callback_url, "https://api.stay.test");
        assert_eq!(config.log_format, LogFormat::Json);
    }
}
