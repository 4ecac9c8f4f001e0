pub mod ids;
pub mod job;
pub mod receipt;
pub mod events;

pub use ids::JobId;
pub use job::{Job, JobKind, NewJob};
pub use receipt::{BackendKind, Receipt};
pub use events::JobEvent;
