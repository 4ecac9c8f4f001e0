use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;

use super::{Claim, IdempotencyGuard, DEFAULT_CLAIM_TTL};
use crate::{QueueError, QueueResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const IN_FLIGHT: &str = "in_flight";
const APPLIED: &str = "applied";

/// Claims the key, or reports the marker that already holds it
const CLAIM_SCRIPT: &str = r#"
if redis.call('SET', KEYS[1], ARGV[1], 'NX', 'PX', ARGV[2]) then
    return 'claimed'
end
return redis.call('GET', KEYS[1]) or ARGV[1]
"#;

/// Deletes the key only while it still holds the in-flight marker
const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// Idempotency store shared by every process talking to the same Redis
#[derive(Clone)]
pub struct RedisIdempotencyStore {
    conn: ConnectionManager,
    prefix: String,
    claim_ttl: Duration,
    retention: Duration,
    claim: redis::Script,
    release: redis::Script,
}

impl RedisIdempotencyStore {
    pub async fn connect(url: &str, prefix: impl Into<String>) -> QueueResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = tokio::time::timeout(CONNECT_TIMEOUT, client.get_connection_manager())
            .await
            .map_err(|_| QueueError::Idempotency("timed out connecting to Redis".to_string()))??;
        Ok(Self::new(conn, prefix))
    }

    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
            claim_ttl: DEFAULT_CLAIM_TTL,
            retention: Duration::from_secs(30 * 24 * 60 * 60),
            claim: redis::Script::new(CLAIM_SCRIPT),
            release: redis::Script::new(RELEASE_SCRIPT),
        }
    }

    /// How long applied keys are remembered
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_claim_ttl(mut self, claim_ttl: Duration) -> Self {
        self.claim_ttl = claim_ttl;
        self
    }

    fn key(&self, scope: &str, key: &str) -> String {
        format!("{}:idempotency:{}:{}", self.prefix, scope, key)
    }
}

#[async_trait]
impl IdempotencyGuard for RedisIdempotencyStore {
    async fn claim(&self, scope: &str, key: &str) -> QueueResult<Claim> {
        let mut conn = self.conn.clone();
        let outcome: String = self
            .claim
            .key(self.key(scope, key))
            .arg(IN_FLIGHT)
            .arg(self.claim_ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;

        Ok(match outcome.as_str() {
            "claimed" => Claim::Claimed,
            APPLIED => Claim::Applied,
            _ => Claim::InFlight,
        })
    }

    async fn complete(&self, scope: &str, key: &str) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(self.key(scope, key))
            .arg(APPLIED)
            .arg("PX")
            .arg(self.retention.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn release(&self, scope: &str, key: &str) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = self
            .release
            .key(self.key(scope, key))
            .arg(IN_FLIGHT)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }
}
