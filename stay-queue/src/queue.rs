use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{info, instrument, warn};

use crate::backend::{DurableQueue, InProcessQueue, QueueBackend};
use crate::broker::Broker;
use crate::config::QueueSettings;
use crate::observability::MetricsSnapshot;
use crate::processor::JobProcessor;
use crate::{BackendKind, JobEvent, NewJob, QueueResult, Receipt};

/// Handle to one named queue, whichever backend ended up serving it.
///
/// The backend is chosen once, when the handle is built, and never changes.
#[derive(Clone)]
pub struct JobQueue {
    backend: Arc<dyn QueueBackend>,
}

impl JobQueue {
    /// Build the queue the settings ask for.
    ///
    /// A durable queue is attempted only when `use_durable` is set. Any
    /// failure on that path (bad URL, unreachable broker, feature compiled
    /// out) is logged and the in-process queue is used instead. This never
    /// fails the caller.
    pub async fn connect(name: &str, settings: &QueueSettings, processor: Arc<dyn JobProcessor>) -> Self {
        #[cfg(feature = "redis")]
        let durable = {
            let processor = processor.clone();
            async move {
                let broker = crate::broker::RedisBroker::connect(&settings.broker_url, settings.key_prefix.clone()).await?;
                DurableQueue::spawn(name, Arc::new(broker), processor, settings).await
            }
        };

        #[cfg(not(feature = "redis"))]
        let durable = async {
            Err::<DurableQueue<crate::broker::MemoryBroker>, _>(crate::QueueError::Config(
                "built without the redis feature".to_string(),
            ))
        };

        Self::select(name, settings, processor, durable).await
    }

    /// Selection with the durable constructor supplied by the caller
    pub async fn select<B, F>(
        name: &str,
        settings: &QueueSettings,
        processor: Arc<dyn JobProcessor>,
        durable: F,
    ) -> Self
    where
        B: Broker,
        F: Future<Output = QueueResult<DurableQueue<B>>>,
    {
        if settings.use_durable {
            match durable.await {
                Ok(queue) => {
                    info!(queue = name, backend = %BackendKind::Durable, "Queue backend selected");
                    return Self::with_backend(Arc::new(queue));
                }
                Err(e) => {
                    warn!(
                        queue = name,
                        error = %e,
                        "Durable broker unavailable, falling back to in-process queue"
                    );
                }
            }
        }

        info!(queue = name, backend = %BackendKind::InProcess, "Queue backend selected");
        Self::in_process(name, processor, settings.processor_timeout)
    }

    pub fn in_process(name: &str, processor: Arc<dyn JobProcessor>, processor_timeout: Duration) -> Self {
        Self::with_backend(Arc::new(InProcessQueue::new(name, processor, processor_timeout)))
    }

    pub fn with_backend(backend: Arc<dyn QueueBackend>) -> Self {
        Self { backend }
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Submit a job. An `Err` means the job was not stored and the caller must surface it.
    #[instrument(skip(self, job), fields(queue = %self.name(), kind = %job.kind))]
    pub async fn enqueue(&self, job: NewJob) -> QueueResult<Receipt> {
        self.backend.enqueue(job).await
    }

    pub async fn start(&self) -> QueueResult<()> {
        self.backend.start().await
    }

    pub async fn shutdown(&self) {
        self.backend.shutdown().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.backend.telemetry().subscribe()
    }

    /// Events as a stream; lagged gaps are skipped
    pub fn event_stream(&self) -> impl Stream<Item = JobEvent> {
        BroadcastStream::new(self.subscribe()).filter_map(|event| event.ok())
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.backend.telemetry().metrics().snapshot()
    }
}
