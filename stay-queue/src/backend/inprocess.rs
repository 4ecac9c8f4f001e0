use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::QueueBackend;
use crate::observability::Telemetry;
use crate::processor::{run_guarded, JobProcessor};
use crate::{BackendKind, Job, NewJob, QueueError, QueueResult, Receipt};

struct Shared {
    name: String,
    pending: Mutex<VecDeque<Job>>,
    wake: Notify,
    closed: AtomicBool,
    processor: Arc<dyn JobProcessor>,
    processor_timeout: Duration,
    telemetry: Telemetry,
}

/// Fallback queue living inside the current process.
///
/// Jobs run one at a time in enqueue order on a single drain task. There is
/// no retry: a failed job is logged and dropped. Nothing survives a restart.
pub struct InProcessQueue {
    shared: Arc<Shared>,
    spawned: AtomicBool,
    drainer: Mutex<Option<JoinHandle<()>>>,
}

impl InProcessQueue {
    pub fn new(
        name: impl Into<String>,
        processor: Arc<dyn JobProcessor>,
        processor_timeout: Duration,
    ) -> Self {
        let name = name.into();
        Self {
            shared: Arc::new(Shared {
                telemetry: Telemetry::new(name.clone()),
                name,
                pending: Mutex::new(VecDeque::new()),
                wake: Notify::new(),
                closed: AtomicBool::new(false),
                processor,
                processor_timeout,
            }),
            spawned: AtomicBool::new(false),
            drainer: Mutex::new(None),
        }
    }

    /// Jobs accepted but not yet handed to the processor
    pub fn pending(&self) -> usize {
        self.shared.pending.lock().len()
    }

    fn ensure_drainer(&self) {
        if self.spawned.swap(true, Ordering::SeqCst) {
            return;
        }
        let shared = self.shared.clone();
        *self.drainer.lock() = Some(tokio::spawn(drain(shared)));
    }
}

async fn drain(shared: Arc<Shared>) {
    debug!(queue = %shared.name, "In-process drain task running");

    loop {
        let next = shared.pending.lock().pop_front();
        let Some(mut job) = next else {
            if shared.closed.load(Ordering::SeqCst) {
                break;
            }
            shared.wake.notified().await;
            continue;
        };

        job.attempt_count += 1;
        shared.telemetry.started(&job);
        debug!(queue = %shared.name, job_id = %job.id, kind = %job.kind, "Processing job");

        match run_guarded(shared.processor.as_ref(), &job, shared.processor_timeout).await {
            Ok(()) => shared.telemetry.completed(&job),
            Err(e) => {
                error!(
                    queue = %shared.name,
                    job_id = %job.id,
                    kind = %job.kind,
                    payload = %job.payload,
                    error = %e,
                    "Job failed and was dropped (in-process queue has no retry)"
                );
                shared.telemetry.dropped(&job, e.message());
            }
        }

        // Give producers and other tasks a turn between jobs
        tokio::task::yield_now().await;
    }
}

#[async_trait]
impl QueueBackend for InProcessQueue {
    async fn enqueue(&self, new_job: NewJob) -> QueueResult<Receipt> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(QueueError::BackendUnavailable(format!(
                "queue '{}' is shut down",
                self.shared.name
            )));
        }

        let job = Job::accept(new_job);
        let receipt = Receipt {
            job_id: job.id.clone(),
            queue: self.shared.name.clone(),
            backend: BackendKind::InProcess,
            accepted_at: Utc::now(),
        };

        self.shared.telemetry.enqueued(&job);
        self.shared.pending.lock().push_back(job);
        self.shared.wake.notify_one();
        self.ensure_drainer();

        Ok(receipt)
    }

    async fn start(&self) -> QueueResult<()> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(QueueError::BackendUnavailable(format!(
                "queue '{}' is shut down",
                self.shared.name
            )));
        }
        self.ensure_drainer();
        info!(queue = %self.shared.name, backend = %BackendKind::InProcess, "Queue started");
        Ok(())
    }

    async fn shutdown(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        if let Some(handle) = self.drainer.lock().take() {
            handle.abort();
        }

        let lost = {
            let mut pending = self.shared.pending.lock();
            let lost = pending.len();
            pending.clear();
            lost
        };
        if lost > 0 {
            warn!(queue = %self.shared.name, lost, "In-process queue shut down with unprocessed jobs");
        } else {
            info!(queue = %self.shared.name, "In-process queue shut down");
        }
    }

    fn kind(&self) -> BackendKind {
        BackendKind::InProcess
    }

    fn name(&self) -> &str {
        &self.shared.name
    }

    fn telemetry(&self) -> &Telemetry {
        &self.shared.telemetry
    }
}
