use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::error;

use super::{Broker, DeadLetter, QueueDepth, Reservation};
use crate::{Job, QueueError, QueueResult};

#[derive(Default)]
struct Lane {
    ready: VecDeque<String>,
    processing: VecDeque<String>,
    delayed: Vec<(i64, String)>,
    dead: VecDeque<String>,
    wake: Arc<Notify>,
}

impl Lane {
    fn take_processing(&mut self, raw: &str) {
        if let Some(pos) = self.processing.iter().position(|entry| entry == raw) {
            self.processing.remove(pos);
        }
    }
}

/// Broker over process memory with the same list semantics as [`RedisBroker`].
///
/// Nothing is durable. Outages can be simulated with [`MemoryBroker::set_available`].
///
/// [`RedisBroker`]: super::RedisBroker
pub struct MemoryBroker {
    lanes: Mutex<HashMap<String, Lane>>,
    available: AtomicBool,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            lanes: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Make every operation fail with a broker error while `false`
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> QueueResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(QueueError::Broker("connection refused".to_string()))
        }
    }

    fn with_lane<T>(&self, queue: &str, f: impl FnOnce(&mut Lane) -> T) -> T {
        let mut lanes = self.lanes.lock();
        f(lanes.entry(queue.to_string()).or_default())
    }

    fn try_reserve(&self, queue: &str) -> (Option<String>, Arc<Notify>) {
        self.with_lane(queue, |lane| {
            let raw = lane.ready.pop_back();
            if let Some(raw) = &raw {
                lane.processing.push_front(raw.clone());
            }
            (raw, lane.wake.clone())
        })
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn ping(&self) -> QueueResult<()> {
        self.check()
    }

    async fn push(&self, queue: &str, job: &Job) -> QueueResult<()> {
        self.check()?;
        let raw = job.to_raw()?;
        let wake = self.with_lane(queue, |lane| {
            lane.ready.push_front(raw);
            lane.wake.clone()
        });
        wake.notify_one();
        Ok(())
    }

    async fn reserve(&self, queue: &str, wait: Duration) -> QueueResult<Option<Reservation>> {
        let deadline = Instant::now() + wait;

        loop {
            self.check()?;
            let (raw, wake) = self.try_reserve(queue);

            if let Some(raw) = raw {
                match Job::from_raw(&raw) {
                    Ok(job) => return Ok(Some(Reservation::new(job, raw))),
                    Err(e) => {
                        error!(queue, error = %e, raw = %raw, "Malformed job moved to dead list");
                        self.with_lane(queue, |lane| {
                            lane.take_processing(&raw);
                            lane.dead.push_front(raw);
                        });
                        continue;
                    }
                }
            }

            if tokio::time::timeout_at(deadline, wake.notified()).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, queue: &str, reservation: &Reservation) -> QueueResult<()> {
        self.check()?;
        self.with_lane(queue, |lane| lane.take_processing(reservation.raw()));
        Ok(())
    }

    async fn retry_at(
        &self,
        queue: &str,
        reservation: &Reservation,
        job: &Job,
        at: DateTime<Utc>,
    ) -> QueueResult<()> {
        self.check()?;
        let raw = job.to_raw()?;
        self.with_lane(queue, |lane| {
            lane.take_processing(reservation.raw());
            lane.delayed.push((at.timestamp_millis(), raw));
        });
        Ok(())
    }

    async fn dead_letter(
        &self,
        queue: &str,
        reservation: &Reservation,
        letter: &DeadLetter,
    ) -> QueueResult<()> {
        self.check()?;
        let raw = serde_json::to_string(letter)?;
        self.with_lane(queue, |lane| {
            lane.take_processing(reservation.raw());
            lane.dead.push_front(raw);
        });
        Ok(())
    }

    async fn promote_due(&self, queue: &str, now: DateTime<Utc>) -> QueueResult<usize> {
        self.check()?;
        let cutoff = now.timestamp_millis();
        let (moved, wake) = self.with_lane(queue, |lane| {
            let mut due: Vec<(i64, String)> = Vec::new();
            lane.delayed.retain(|(score, raw)| {
                if *score <= cutoff {
                    due.push((*score, raw.clone()));
                    false
                } else {
                    true
                }
            });
            due.sort_by_key(|(score, _)| *score);
            let moved = due.len();
            for (_, raw) in due {
                lane.ready.push_front(raw);
            }
            (moved, lane.wake.clone())
        });

        for _ in 0..moved {
            wake.notify_one();
        }
        Ok(moved)
    }

    async fn recover_in_flight(&self, queue: &str) -> QueueResult<usize> {
        self.check()?;
        let (moved, wake) = self.with_lane(queue, |lane| {
            let moved = lane.processing.len();
            // Oldest reservation sits at the back; it must come out of ready first
            while let Some(raw) = lane.processing.pop_front() {
                lane.ready.push_back(raw);
            }
            (moved, lane.wake.clone())
        });

        for _ in 0..moved {
            wake.notify_one();
        }
        Ok(moved)
    }

    async fn dead_letters(&self, queue: &str, limit: usize) -> QueueResult<Vec<DeadLetter>> {
        self.check()?;
        let raws: Vec<String> =
            self.with_lane(queue, |lane| lane.dead.iter().take(limit).cloned().collect());

        Ok(raws
            .iter()
            .filter_map(|raw| serde_json::from_str(raw).ok())
            .collect())
    }

    async fn depth(&self, queue: &str) -> QueueResult<QueueDepth> {
        self.check()?;
        Ok(self.with_lane(queue, |lane| QueueDepth {
            ready: lane.ready.len(),
            processing: lane.processing.len(),
            delayed: lane.delayed.len(),
            dead: lane.dead.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{JobKind, NewJob};
    use serde_json::json;

    fn webhook(id: &str) -> Job {
        Job::accept(NewJob::new(JobKind::Webhook, json!({ "webhookId": id })))
    }

    #[tokio::test]
    async fn test_reserve_is_fifo_and_tracks_processing() {
        let broker = MemoryBroker::new();
        broker.push("webhooks", &webhook("a")).await.unwrap();
        broker.push("webhooks", &webhook("b")).await.unwrap();

        let first = broker.reserve("webhooks", Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(first.job.payload["webhookId"], "a");
        assert_eq!(broker.depth("webhooks").await.unwrap().processing, 1);

        broker.ack("webhooks", &first).await.unwrap();
        let depth = broker.depth("webhooks").await.unwrap();
        assert_eq!((depth.ready, depth.processing), (1, 0));
    }

    #[tokio::test]
    async fn test_reserve_times_out_when_empty() {
        let broker = MemoryBroker::new();

        let reserved = broker.reserve("webhooks", Duration::from_millis(20)).await.unwrap();
        assert!(reserved.is_none());
    }

    #[tokio::test]
    async fn test_blocked_reserve_wakes_on_push() {
        let broker = Arc::new(MemoryBroker::new());
        let waiter = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.reserve("bookings", Duration::from_secs(5)).await })
        };

        tokio::task::yield_now().await;
        broker.push("bookings", &webhook("late")).await.unwrap();

        let reserved = waiter.await.unwrap().unwrap().unwrap();
        assert_eq!(reserved.job.payload["webhookId"], "late");
    }

    #[tokio::test]
    async fn test_delayed_jobs_promote_when_due() {
        let broker = MemoryBroker::new();
        broker.push("webhooks", &webhook("a")).await.unwrap();
        let reserved = broker.reserve("webhooks", Duration::ZERO).await.unwrap().unwrap();
        let now = Utc::now();

        let mut retried = reserved.job.clone();
        retried.attempt_count = 1;
        broker
            .retry_at("webhooks", &reserved, &retried, now + chrono::Duration::seconds(30))
            .await
            .unwrap();

        assert_eq!(broker.promote_due("webhooks", now).await.unwrap(), 0);
        assert_eq!(
            broker.promote_due("webhooks", now + chrono::Duration::seconds(31)).await.unwrap(),
            1
        );

        let again = broker.reserve("webhooks", Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(again.job.attempt_count, 1);
    }

    #[tokio::test]
    async fn test_recover_returns_stranded_jobs_in_order() {
        let broker = MemoryBroker::new();
        for id in ["a", "b", "c"] {
            broker.push("webhooks", &webhook(id)).await.unwrap();
        }
        let _a = broker.reserve("webhooks", Duration::ZERO).await.unwrap();
        let _b = broker.reserve("webhooks", Duration::ZERO).await.unwrap();

        assert_eq!(broker.recover_in_flight("webhooks").await.unwrap(), 2);

        let mut order = Vec::new();
        while let Some(r) = broker.reserve("webhooks", Duration::ZERO).await.unwrap() {
            order.push(r.job.payload["webhookId"].as_str().unwrap().to_string());
        }
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_outage_fails_every_operation() {
        let broker = MemoryBroker::new();
        broker.set_available(false);

        assert!(broker.ping().await.is_err());
        assert!(broker.push("webhooks", &webhook("a")).await.is_err());

        broker.set_available(true);
        assert!(broker.push("webhooks", &webhook("a")).await.is_ok());
    }
}
