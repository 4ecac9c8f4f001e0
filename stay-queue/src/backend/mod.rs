pub mod durable;
pub mod inprocess;

pub use durable::DurableQueue;
pub use inprocess::InProcessQueue;

use async_trait::async_trait;

use crate::observability::Telemetry;
use crate::{BackendKind, NewJob, QueueResult, Receipt};

/// One named queue on one backend, as seen by producers and the worker
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Accept a job. On `Ok` the backend owns it; on `Err` nothing was stored.
    async fn enqueue(&self, job: NewJob) -> QueueResult<Receipt>;

    /// Begin processing. Calling it again is a no-op.
    async fn start(&self) -> QueueResult<()>;

    /// Stop processing. Never waits for in-flight work to drain.
    async fn shutdown(&self);

    fn kind(&self) -> BackendKind;

    fn name(&self) -> &str;

    fn telemetry(&self) -> &Telemetry;
}
