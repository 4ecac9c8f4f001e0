use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use super::{Claim, IdempotencyGuard, DEFAULT_CLAIM_TTL};
use crate::QueueResult;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS job_idempotency (
    scope       TEXT        NOT NULL,
    key         TEXT        NOT NULL,
    state       TEXT        NOT NULL,
    claimed_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (scope, key)
)
"#;

/// Idempotency store backed by a unique constraint on `(scope, key)`
#[derive(Clone)]
pub struct PgIdempotencyStore {
    pool: PgPool,
    claim_ttl: Duration,
}

impl PgIdempotencyStore {
    pub async fn connect(url: &str) -> QueueResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            claim_ttl: DEFAULT_CLAIM_TTL,
        }
    }

    pub fn with_claim_ttl(mut self, claim_ttl: Duration) -> Self {
        self.claim_ttl = claim_ttl;
        self
    }

    /// Create the backing table if it does not exist yet
    pub async fn ensure_schema(&self) -> QueueResult<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl IdempotencyGuard for PgIdempotencyStore {
    async fn claim(&self, scope: &str, key: &str) -> QueueResult<Claim> {
        let inserted = sqlx::query(
            "INSERT INTO job_idempotency (scope, key, state) VALUES ($1, $2, 'in_flight') \
             ON CONFLICT (scope, key) DO NOTHING",
        )
        .bind(scope)
        .bind(key)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 1 {
            return Ok(Claim::Claimed);
        }

        // Take over a claim whose owner went away without completing or releasing
        let taken_over = sqlx::query(
            "UPDATE job_idempotency SET claimed_at = now() \
             WHERE scope = $1 AND key = $2 AND state = 'in_flight' \
             AND claimed_at < now() - make_interval(secs => $3)",
        )
        .bind(scope)
        .bind(key)
        .bind(self.claim_ttl.as_secs_f64())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if taken_over == 1 {
            return Ok(Claim::Claimed);
        }

        let state: Option<String> =
            sqlx::query_scalar("SELECT state FROM job_idempotency WHERE scope = $1 AND key = $2")
                .bind(scope)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        // A row released in between reads as in flight; the redelivery will claim it
        Ok(match state.as_deref() {
            Some("applied") => Claim::Applied,
            _ => Claim::InFlight,
        })
    }

    async fn complete(&self, scope: &str, key: &str) -> QueueResult<()> {
        sqlx::query(
            "INSERT INTO job_idempotency (scope, key, state) VALUES ($1, $2, 'applied') \
             ON CONFLICT (scope, key) DO UPDATE SET state = 'applied'",
        )
        .bind(scope)
        .bind(key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn release(&self, scope: &str, key: &str) -> QueueResult<()> {
        sqlx::query("DELETE FROM job_idempotency WHERE scope = $1 AND key = $2 AND state = 'in_flight'")
            .bind(scope)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
