use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::broker::Broker;

/// Promote due retries from the delayed set back to ready, forever
pub(super) async fn run<B: Broker>(queue: String, broker: Arc<B>, poll_interval: Duration) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match broker.promote_due(&queue, Utc::now()).await {
            Ok(0) => {}
            Ok(moved) => debug!(queue = %queue, moved, "Promoted due retries"),
            Err(e) => {
                warn!(queue = %queue, error = %e, "Retry promotion failed");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
