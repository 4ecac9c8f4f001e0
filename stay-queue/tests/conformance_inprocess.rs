use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use stay_queue::{
    BackendKind, FnProcessor, GuardedProcessor, Job, JobError, JobEvent, JobKind, JobProcessor, JobQueue,
    MemoryIdempotencyStore, NewJob, QueueSettings,
};

fn recording_processor() -> (Arc<Mutex<Vec<Job>>>, Arc<dyn JobProcessor>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let processor = FnProcessor::new(move |job: Job| {
        let sink = sink.clone();
        async move {
            if job.payload.get("explode").is_some() {
                panic!("processor bug");
            }
            sink.lock().push(job);
            Ok(())
        }
        .boxed()
    });
    (seen, Arc::new(processor))
}

async fn wait_terminal(rx: &mut broadcast::Receiver<JobEvent>, count: usize) -> Vec<JobEvent> {
    let mut terminal = Vec::new();
    while terminal.len() < count {
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("Timeout waiting for event")
            .expect("Event receive error");
        if event.is_terminal() {
            terminal.push(event);
        }
    }
    terminal
}

/// B1. Fallback runs jobs in enqueue order
#[tokio::test]
async fn test_fallback_processes_in_fifo_order() {
    let (seen, processor) = recording_processor();
    let queue = JobQueue::connect("webhooks", &QueueSettings::default(), processor).await;
    let mut rx = queue.subscribe();

    // Arrange
    queue.start().await.unwrap();

    // Act: enqueue three webhooks back to back
    for id in ["evt_1", "evt_2", "evt_3"] {
        queue
            .enqueue(NewJob::new(JobKind::Webhook, json!({ "webhookId": id })))
            .await
            .unwrap();
    }
    wait_terminal(&mut rx, 3).await;

    // Assert
    let order: Vec<String> = seen
        .lock()
        .iter()
        .map(|job| job.payload["webhookId"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(order, vec!["evt_1", "evt_2", "evt_3"]);
    assert_eq!(queue.backend_kind(), BackendKind::InProcess);
}

/// B2. Payload reaches the processor untouched
#[tokio::test]
async fn test_payload_is_preserved() {
    let (seen, processor) = recording_processor();
    let queue = JobQueue::connect("bookings", &QueueSettings::default(), processor).await;
    let mut rx = queue.subscribe();
    let payload = json!({
        "weekId": 7,
        "userId": 19,
        "reservations": [{ "roomId": 3, "guests": 2 }],
        "checkIn": "2026-11-02",
        "checkOut": "2026-11-09",
        "totalPrice": 1240.5
    });

    // Act
    let receipt = queue
        .enqueue(NewJob::new(JobKind::BookingCreation, payload.clone()).with_idempotency_key("bk-1"))
        .await
        .unwrap();
    wait_terminal(&mut rx, 1).await;

    // Assert
    let seen = seen.lock();
    assert_eq!(seen[0].id, receipt.job_id);
    assert_eq!(seen[0].payload, payload);
    assert_eq!(seen[0].idempotency_key.as_deref(), Some("bk-1"));
    assert_eq!(seen[0].attempt_count, 1);
}

/// B3. Unusable broker URL selects the fallback, which still processes
#[tokio::test]
async fn test_invalid_broker_url_falls_back() {
    let (seen, processor) = recording_processor();
    let settings = QueueSettings {
        use_durable: true,
        broker_url: "not a broker url".to_string(),
        ..QueueSettings::default()
    };

    // Act
    let queue = JobQueue::connect("webhooks", &settings, processor).await;
    let mut rx = queue.subscribe();
    let receipt = queue
        .enqueue(NewJob::new(JobKind::Webhook, json!({ "webhookId": "evt_9" })))
        .await
        .unwrap();
    wait_terminal(&mut rx, 1).await;

    // Assert
    assert_eq!(queue.backend_kind(), BackendKind::InProcess);
    assert_eq!(receipt.backend, BackendKind::InProcess);
    assert_eq!(seen.lock().len(), 1);
}

/// B4. A panicking processor does not stop the queue
#[tokio::test]
async fn test_panic_is_contained() {
    let (seen, processor) = recording_processor();
    let queue = JobQueue::connect("webhooks", &QueueSettings::default(), processor).await;
    let mut rx = queue.subscribe();

    // Act
    queue
        .enqueue(NewJob::new(JobKind::Webhook, json!({ "webhookId": "evt_1", "explode": true })))
        .await
        .unwrap();
    queue
        .enqueue(NewJob::new(JobKind::Webhook, json!({ "webhookId": "evt_2" })))
        .await
        .unwrap();
    let events = wait_terminal(&mut rx, 2).await;

    // Assert
    match &events[0] {
        JobEvent::Dropped { error, .. } => assert!(error.contains("processor bug")),
        other => panic!("expected dropped event, got {:?}", other),
    }
    assert!(matches!(events[1], JobEvent::Completed { .. }));
    assert_eq!(seen.lock().len(), 1);
    assert_eq!(queue.metrics().dropped, 1);
}

/// B5. Duplicate keys produce a single side effect
#[tokio::test]
async fn test_idempotency_key_collapses_duplicates() {
    let bookings = Arc::new(Mutex::new(0u32));
    let counter = bookings.clone();
    let inner = FnProcessor::new(move |_job: Job| {
        let counter = counter.clone();
        async move {
            *counter.lock() += 1;
            Ok::<(), JobError>(())
        }
        .boxed()
    });
    let guarded = Arc::new(GuardedProcessor::new(
        "bookings",
        inner,
        Arc::new(MemoryIdempotencyStore::new()),
    ));
    let queue = JobQueue::in_process("bookings", guarded.clone(), Duration::from_secs(1));
    let mut rx = queue.subscribe();

    // Act: the same booking submitted three times
    for _ in 0..3 {
        queue
            .enqueue(NewJob::new(JobKind::BookingCreation, json!({ "weekId": 4 })).with_idempotency_key("k1"))
            .await
            .unwrap();
    }
    wait_terminal(&mut rx, 3).await;

    // Assert
    assert_eq!(*bookings.lock(), 1);
    assert_eq!(guarded.duplicates(), 2);
}

/// B6. start() twice is harmless
#[tokio::test]
async fn test_start_is_idempotent() {
    let (seen, processor) = recording_processor();
    let queue = JobQueue::connect("webhooks", &QueueSettings::default(), processor).await;
    let mut rx = queue.subscribe();

    // Act
    queue.start().await.unwrap();
    queue.start().await.unwrap();
    queue
        .enqueue(NewJob::new(JobKind::Webhook, json!({ "webhookId": "evt_1" })))
        .await
        .unwrap();
    wait_terminal(&mut rx, 1).await;

    // Assert: one drain task, one invocation
    assert_eq!(seen.lock().len(), 1);
    assert_eq!(queue.metrics().completed, 1);
}
