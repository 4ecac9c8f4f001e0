mod consumer;
mod scheduler;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use self::consumer::Consumer;
use super::QueueBackend;
use crate::broker::{Broker, DeadLetter, QueueDepth};
use crate::config::QueueSettings;
use crate::observability::Telemetry;
use crate::processor::JobProcessor;
use crate::{BackendKind, Job, NewJob, QueueError, QueueResult, Receipt};

/// Broker-backed queue with bounded retry and a dead-letter list.
///
/// Consumers and the retry scheduler are spawned on construction, so a
/// durable queue is working as soon as [`DurableQueue::spawn`] returns.
pub struct DurableQueue<B: Broker> {
    name: String,
    broker: Arc<B>,
    telemetry: Telemetry,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl<B: Broker> DurableQueue<B> {
    pub async fn spawn(
        name: impl Into<String>,
        broker: Arc<B>,
        processor: Arc<dyn JobProcessor>,
        settings: &QueueSettings,
    ) -> QueueResult<Self> {
        let name = name.into();
        broker.ping().await?;

        if settings.recover_in_flight {
            let recovered = broker.recover_in_flight(&name).await?;
            if recovered > 0 {
                warn!(queue = %name, recovered, "Returned jobs left in processing by a previous worker");
            }
        }

        let telemetry = Telemetry::new(name.clone());
        let mut tasks = Vec::with_capacity(settings.consumers + 1);

        tasks.push(tokio::spawn(scheduler::run(
            name.clone(),
            broker.clone(),
            settings.poll_interval,
        )));

        for index in 0..settings.consumers {
            let consumer = Consumer {
                index,
                queue: name.clone(),
                broker: broker.clone(),
                processor: processor.clone(),
                telemetry: telemetry.clone(),
                retry: settings.retry.clone(),
                processor_timeout: settings.processor_timeout,
                reserve_timeout: settings.reserve_timeout,
            };
            tasks.push(tokio::spawn(consumer.run()));
        }

        info!(queue = %name, consumers = settings.consumers, "Durable queue consumers spawned");

        Ok(Self {
            name,
            broker,
            telemetry,
            tasks: Mutex::new(tasks),
            started: AtomicBool::new(false),
        })
    }

    /// Jobs that exhausted retries or failed permanently, most recent first
    pub async fn dead_letters(&self, limit: usize) -> QueueResult<Vec<DeadLetter>> {
        self.broker.dead_letters(&self.name, limit).await
    }

    pub async fn depth(&self) -> QueueResult<QueueDepth> {
        self.broker.depth(&self.name).await
    }
}

#[async_trait]
impl<B: Broker> QueueBackend for DurableQueue<B> {
    async fn enqueue(&self, new_job: NewJob) -> QueueResult<Receipt> {
        let job = Job::accept(new_job);

        self.broker.push(&self.name, &job).await.map_err(|e| match e {
            QueueError::Serialization(_) => e,
            other => QueueError::BackendUnavailable(other.to_string()),
        })?;
        self.telemetry.enqueued(&job);

        Ok(Receipt {
            job_id: job.id,
            queue: self.name.clone(),
            backend: BackendKind::Durable,
            accepted_at: Utc::now(),
        })
    }

    async fn start(&self) -> QueueResult<()> {
        if !self.started.swap(true, Ordering::SeqCst) {
            info!(queue = %self.name, backend = %BackendKind::Durable, "Queue started");
        }
        Ok(())
    }

    async fn shutdown(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in &tasks {
            task.abort();
        }
        info!(queue = %self.name, "Durable queue shut down; unacked jobs stay in the broker");
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Durable
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }
}

impl<B: Broker> Drop for DurableQueue<B> {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}
