use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use stay_queue::observability::Telemetry;
use stay_queue::{
    BackendKind, Job, JobError, JobEvent, JobKind, JobProcessor, JobQueue, NewJob, QueueBackend, QueueError,
    QueueResult, QueueSettings, Receipt,
};
use stay_worker::{queue_specs, HttpCallbacks, QueueSpec, Worker, WorkerState};

/// Backend whose construction succeeded but which refuses to start
struct BrokenBackend {
    name: String,
    telemetry: Telemetry,
}

impl BrokenBackend {
    fn queue(name: &str) -> JobQueue {
        JobQueue::with_backend(Arc::new(Self {
            name: name.to_string(),
            telemetry: Telemetry::new(name),
        }))
    }
}

#[async_trait]
impl QueueBackend for BrokenBackend {
    async fn enqueue(&self, _job: NewJob) -> QueueResult<Receipt> {
        Err(QueueError::BackendUnavailable("broken".to_string()))
    }

    async fn start(&self) -> QueueResult<()> {
        Err(QueueError::Broker("connection reset during start".to_string()))
    }

    async fn shutdown(&self) {}

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

struct Noop;

#[async_trait]
impl JobProcessor for Noop {
    async fn process(&self, _job: &Job) -> Result<(), JobError> {
        Ok(())
    }
}

/// Reports every job it is handed, then never finishes
struct Stuck {
    handed: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl JobProcessor for Stuck {
    async fn process(&self, job: &Job) -> Result<(), JobError> {
        let _ = self.handed.send(job.id.to_string());
        futures::future::pending::<()>().await;
        Ok(())
    }
}

#[tokio::test]
async fn test_one_failing_queue_does_not_block_the_other() {
    // Arrange
    let healthy = JobQueue::in_process("bookings", Arc::new(Noop), Duration::from_secs(1));

    // Act
    let worker = Worker::from_queues(vec![BrokenBackend::queue("webhooks"), healthy])
        .await
        .unwrap();

    // Assert
    assert_eq!(worker.state(), WorkerState::Running);
    assert_eq!(worker.queues().len(), 1);
    assert_eq!(worker.queues()[0].name(), "bookings");
}

#[tokio::test]
async fn test_no_queue_started_is_a_startup_failure() {
    let result = Worker::from_queues(vec![BrokenBackend::queue("webhooks"), BrokenBackend::queue("bookings")]).await;

    assert!(matches!(result, Err(QueueError::StartupFailure(_))));
}

#[tokio::test]
async fn test_empty_spec_list_is_a_startup_failure() {
    let result = Worker::start(Vec::new(), &QueueSettings::default()).await;

    assert!(matches!(result, Err(QueueError::StartupFailure(_))));
}

#[tokio::test]
async fn test_shutdown_walks_through_draining_to_stopped() {
    // Arrange
    let specs = vec![
        QueueSpec::new("webhooks", Arc::new(Noop)),
        QueueSpec::new("bookings", Arc::new(Noop)),
    ];
    let worker = Worker::start(specs, &QueueSettings::default()).await.unwrap();
    let mut states = worker.watch_state();
    let queue = worker.queues()[0].clone();
    assert_eq!(worker.queues().len(), 2);

    // Act
    let final_state = worker.run_until(async {}).await;

    // Assert
    assert_eq!(final_state, WorkerState::Stopped);
    assert_eq!(*states.borrow_and_update(), WorkerState::Stopped);
    let err = queue
        .enqueue(NewJob::new(JobKind::Webhook, serde_json::json!({ "webhookId": "late" })))
        .await
        .unwrap_err();
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn test_specs_follow_configured_kinds() {
    let callbacks = HttpCallbacks::new("http://127.0.0.1:3000", Duration::from_secs(1)).unwrap();
    let guard = Arc::new(stay_queue::MemoryIdempotencyStore::new());

    let specs = queue_specs(&[JobKind::BookingCreation], &callbacks, guard);

    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].name, "bookings");
}

#[tokio::test]
async fn test_fallback_jobs_queued_at_shutdown_are_never_processed() {
    // Arrange
    let (tx, mut handed) = mpsc::unbounded_channel();
    let queue = JobQueue::in_process("webhooks", Arc::new(Stuck { handed: tx }), Duration::from_secs(60));
    let worker = Worker::from_queues(vec![queue.clone()]).await.unwrap();
    let mut rx = queue.subscribe();
    let first = queue
        .enqueue(NewJob::new(JobKind::Webhook, serde_json::json!({ "webhookId": "evt_1" })))
        .await
        .unwrap();
    queue
        .enqueue(NewJob::new(JobKind::Webhook, serde_json::json!({ "webhookId": "evt_2" })))
        .await
        .unwrap();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("Timeout waiting for first job to start")
            .expect("Event receive error");
        if matches!(event, JobEvent::Started { .. }) {
            break;
        }
    }

    // Act
    let final_state = worker.run_until(async {}).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Assert
    assert_eq!(final_state, WorkerState::Stopped);
    assert_eq!(handed.try_recv().unwrap(), first.job_id.to_string());
    assert!(handed.try_recv().is_err());
    assert_eq!(queue.metrics().completed, 0);
}
