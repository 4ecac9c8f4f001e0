use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::{Claim, IdempotencyGuard, DEFAULT_CLAIM_TTL};
use crate::QueueResult;

#[derive(Debug, Clone, Copy)]
enum Entry {
    InFlight { since: Instant },
    Applied,
}

/// Process-local idempotency store
#[derive(Debug)]
pub struct MemoryIdempotencyStore {
    entries: Mutex<HashMap<(String, String), Entry>>,
    claim_ttl: Duration,
}

impl MemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::with_claim_ttl(DEFAULT_CLAIM_TTL)
    }

    pub fn with_claim_ttl(claim_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            claim_ttl,
        }
    }

    /// Whether the key has been applied (claimed and completed)
    pub fn is_applied(&self, scope: &str, key: &str) -> bool {
        matches!(
            self.entries.lock().get(&(scope.to_string(), key.to_string())),
            Some(Entry::Applied)
        )
    }
}

impl Default for MemoryIdempotencyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdempotencyGuard for MemoryIdempotencyStore {
    async fn claim(&self, scope: &str, key: &str) -> QueueResult<Claim> {
        let mut entries = self.entries.lock();
        let slot = (scope.to_string(), key.to_string());

        match entries.get(&slot) {
            Some(Entry::Applied) => Ok(Claim::Applied),
            Some(Entry::InFlight { since }) if since.elapsed() < self.claim_ttl => {
                Ok(Claim::InFlight)
            }
            _ => {
                entries.insert(slot, Entry::InFlight { since: Instant::now() });
                Ok(Claim::Claimed)
            }
        }
    }

    async fn complete(&self, scope: &str, key: &str) -> QueueResult<()> {
        self.entries
            .lock()
            .insert((scope.to_string(), key.to_string()), Entry::Applied);
        Ok(())
    }

    async fn release(&self, scope: &str, key: &str) -> QueueResult<()> {
        let mut entries = self.entries.lock();
        let slot = (scope.to_string(), key.to_string());
        if matches!(entries.get(&slot), Some(Entry::InFlight { .. })) {
            entries.remove(&slot);
        }
        Ok(())
    }
}
