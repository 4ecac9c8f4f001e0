use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use stay_queue::{JobProcessor, JobQueue, QueueError, QueueResult, QueueSettings};

/// Observable phase of the worker process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Running,
    Draining,
    Stopped,
}

/// One queue the worker should run
#[derive(Clone)]
pub struct QueueSpec {
    pub name: String,
    pub processor: Arc<dyn JobProcessor>,
}

impl QueueSpec {
    pub fn new(name: impl Into<String>, processor: Arc<dyn JobProcessor>) -> Self {
        Self {
            name: name.into(),
            processor,
        }
    }
}

/// Owns the running queues for the lifetime of the process
pub struct Worker {
    queues: Vec<JobQueue>,
    state: watch::Sender<WorkerState>,
}

impl Worker {
    /// Connect every spec's queue concurrently, then start them
    pub async fn start(specs: Vec<QueueSpec>, settings: &QueueSettings) -> QueueResult<Self> {
        let queues = join_all(
            specs
                .iter()
                .map(|spec| JobQueue::connect(&spec.name, settings, spec.processor.clone())),
        )
        .await;

        Self::from_queues(queues).await
    }

    /// Start already-built queues. Each queue fails on its own; only when
    /// none of them starts is the whole worker a failure.
    pub async fn from_queues(queues: Vec<JobQueue>) -> QueueResult<Self> {
        let (state, _) = watch::channel(WorkerState::Starting);

        let results = join_all(queues.into_iter().map(|queue| async move {
            let result = queue.start().await;
            (queue, result)
        }))
        .await;

        let mut running = Vec::new();
        for (queue, result) in results {
            match result {
                Ok(()) => {
                    info!(queue = queue.name(), backend = %queue.backend_kind(), "Queue running");
                    running.push(queue);
                }
                Err(e) => error!(queue = queue.name(), error = %e, "Queue failed to start"),
            }
        }

        if running.is_empty() {
            return Err(QueueError::StartupFailure("no queue could be started".to_string()));
        }

        state.send_replace(WorkerState::Running);
        info!(queues = running.len(), "Worker running");

        Ok(Self { queues: running, state })
    }

    pub fn queues(&self) -> &[JobQueue] {
        &self.queues
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Run until `shutdown` resolves, then stop every queue without draining
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> WorkerState {
        shutdown.await;

        self.state.send_replace(WorkerState::Draining);
        info!("Shutdown requested, stopping queues");

        join_all(self.queues.iter().map(|queue| queue.shutdown())).await;

        self.state.send_replace(WorkerState::Stopped);
        info!("Worker stopped");
        WorkerState::Stopped
    }
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
