use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::{Client, Script};
use std::time::Duration;
use tracing::{debug, error, warn};

use super::{Broker, DeadLetter, QueueDepth, Reservation};
use crate::{Job, QueueError, QueueResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const PROMOTE_BATCH: usize = 100;

// KEYS[1] delayed zset, KEYS[2] ready list; ARGV[1] cutoff millis, ARGV[2] batch
const PROMOTE_DUE: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, ARGV[2])
for _, member in ipairs(due) do
    redis.call('ZREM', KEYS[1], member)
    redis.call('LPUSH', KEYS[2], member)
end
return #due
"#;

/// Durable broker over Redis lists and a sorted set.
///
/// Keys per queue: `{prefix}:{queue}:ready`, `:processing`, `:delayed`, `:dead`.
/// Producers push left, consumers take right, so the ready list is FIFO.
pub struct RedisBroker {
    client: Client,
    conn: ConnectionManager,
    prefix: String,
    promote: Script,
    // BLMOVE holds its connection for the whole wait, one connection per waiting consumer
    blocking: Mutex<Vec<MultiplexedConnection>>,
}

impl RedisBroker {
    /// Open a client, probe it with `PING`, then build the managed connection.
    ///
    /// Fails fast on a malformed URL or an unreachable server.
    pub async fn connect(url: &str, prefix: impl Into<String>) -> QueueResult<Self> {
        let client = Client::open(url)?;

        let mut probe = tokio::time::timeout(CONNECT_TIMEOUT, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| QueueError::Broker("timed out connecting to broker".to_string()))??;
        let _: String = redis::cmd("PING").query_async(&mut probe).await?;

        let conn = tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(client.clone()))
            .await
            .map_err(|_| QueueError::Broker("timed out connecting to broker".to_string()))??;

        Ok(Self {
            client,
            conn,
            prefix: prefix.into(),
            promote: Script::new(PROMOTE_DUE),
            blocking: Mutex::new(vec![probe]),
        })
    }

    fn key(&self, queue: &str, list: &str) -> String {
        format!("{}:{}:{}", self.prefix, queue, list)
    }

    async fn blocking_conn(&self) -> QueueResult<MultiplexedConnection> {
        let pooled = self.blocking.lock().pop();
        match pooled {
            Some(conn) => Ok(conn),
            None => Ok(self.client.get_multiplexed_async_connection().await?),
        }
    }

    async fn quarantine(&self, queue: &str, raw: &str) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("LREM")
            .arg(self.key(queue, "processing"))
            .arg(1)
            .arg(raw)
            .ignore()
            .cmd("LPUSH")
            .arg(self.key(queue, "dead"))
            .arg(raw)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn push(&self, queue: &str, job: &Job) -> QueueResult<()> {
        let raw = job.to_raw()?;
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("LPUSH")
            .arg(self.key(queue, "ready"))
            .arg(raw)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn reserve(&self, queue: &str, wait: Duration) -> QueueResult<Option<Reservation>> {
        let mut conn = self.blocking_conn().await?;

        let moved: Option<String> = redis::cmd("BLMOVE")
            .arg(self.key(queue, "ready"))
            .arg(self.key(queue, "processing"))
            .arg("RIGHT")
            .arg("LEFT")
            .arg(wait.as_secs_f64())
            .query_async(&mut conn)
            .await?;

        // Only a connection that completed its command goes back to the pool
        self.blocking.lock().push(conn);

        let Some(raw) = moved else {
            return Ok(None);
        };

        match Job::from_raw(&raw) {
            Ok(job) => Ok(Some(Reservation::new(job, raw))),
            Err(e) => {
                error!(queue, error = %e, raw = %raw, "Malformed job moved to dead list");
                self.quarantine(queue, &raw).await?;
                Ok(None)
            }
        }
    }

    async fn ack(&self, queue: &str, reservation: &Reservation) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("LREM")
            .arg(self.key(queue, "processing"))
            .arg(1)
            .arg(reservation.raw())
            .query_async(&mut conn)
            .await?;

        if removed == 0 {
            warn!(queue, job_id = %reservation.job.id, "Acked job was no longer in processing");
        }
        Ok(())
    }

    async fn retry_at(
        &self,
        queue: &str,
        reservation: &Reservation,
        job: &Job,
        at: DateTime<Utc>,
    ) -> QueueResult<()> {
        let raw = job.to_raw()?;
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("LREM")
            .arg(self.key(queue, "processing"))
            .arg(1)
            .arg(reservation.raw())
            .ignore()
            .cmd("ZADD")
            .arg(self.key(queue, "delayed"))
            .arg(at.timestamp_millis())
            .arg(raw)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn dead_letter(
        &self,
        queue: &str,
        reservation: &Reservation,
        letter: &DeadLetter,
    ) -> QueueResult<()> {
        let raw = serde_json::to_string(letter)?;
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("LREM")
            .arg(self.key(queue, "processing"))
            .arg(1)
            .arg(reservation.raw())
            .ignore()
            .cmd("LPUSH")
            .arg(self.key(queue, "dead"))
            .arg(raw)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn promote_due(&self, queue: &str, now: DateTime<Utc>) -> QueueResult<usize> {
        let mut conn = self.conn.clone();
        let moved: usize = self
            .promote
            .key(self.key(queue, "delayed"))
            .key(self.key(queue, "ready"))
            .arg(now.timestamp_millis())
            .arg(PROMOTE_BATCH)
            .invoke_async(&mut conn)
            .await?;
        Ok(moved)
    }

    async fn recover_in_flight(&self, queue: &str) -> QueueResult<usize> {
        let mut conn = self.conn.clone();
        let mut moved = 0;

        // Newest reservation sits at the head of processing; pushing each to
        // the consuming end leaves the oldest to be taken first
        loop {
            let raw: Option<String> = redis::cmd("LMOVE")
                .arg(self.key(queue, "processing"))
                .arg(self.key(queue, "ready"))
                .arg("LEFT")
                .arg("RIGHT")
                .query_async(&mut conn)
                .await?;
            if raw.is_none() {
                break;
            }
            moved += 1;
        }

        debug!(queue, moved, "Recovered in-flight jobs");
        Ok(moved)
    }

    async fn dead_letters(&self, queue: &str, limit: usize) -> QueueResult<Vec<DeadLetter>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        let raws: Vec<String> = redis::cmd("LRANGE")
            .arg(self.key(queue, "dead"))
            .arg(0)
            .arg(limit as i64 - 1)
            .query_async(&mut conn)
            .await?;

        Ok(raws
            .iter()
            .filter_map(|raw| match serde_json::from_str(raw) {
                Ok(letter) => Some(letter),
                Err(e) => {
                    warn!(queue, error = %e, "Skipping undecodable dead letter");
                    None
                }
            })
            .collect())
    }

    async fn depth(&self, queue: &str) -> QueueResult<QueueDepth> {
        let mut conn = self.conn.clone();
        let (ready, processing, delayed, dead): (usize, usize, usize, usize) = redis::pipe()
            .cmd("LLEN")
            .arg(self.key(queue, "ready"))
            .cmd("LLEN")
            .arg(self.key(queue, "processing"))
            .cmd("ZCARD")
            .arg(self.key(queue, "delayed"))
            .cmd("LLEN")
            .arg(self.key(queue, "dead"))
            .query_async(&mut conn)
            .await?;

        Ok(QueueDepth {
            ready,
            processing,
            delayed,
            dead,
        })
    }
}
