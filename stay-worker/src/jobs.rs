//! Payload contracts shared with the API layer that produces these jobs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use stay_queue::{JobKind, NewJob, QueueError, QueueResult};

/// A PMS webhook to ingest. The webhook id doubles as the idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookJob {
    pub webhook_id: String,
}

impl WebhookJob {
    pub fn new(webhook_id: impl Into<String>) -> Self {
        Self {
            webhook_id: webhook_id.into(),
        }
    }

    pub fn into_job(self) -> QueueResult<NewJob> {
        let key = self.webhook_id.clone();
        Ok(NewJob::new(JobKind::Webhook, to_payload(&self)?).with_idempotency_key(key))
    }
}

/// A booking creation request accepted by the API and finished in the background
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingJob {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    /// Room reservations, passed through to the booking service as-is
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservations: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_in: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_out: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_price: Option<f64>,
}

impl BookingJob {
    pub fn into_job(self) -> QueueResult<NewJob> {
        let key = self.idempotency_key.clone();
        let job = NewJob::new(JobKind::BookingCreation, to_payload(&self)?);
        Ok(match key {
            Some(key) => job.with_idempotency_key(key),
            None => job,
        })
    }
}

fn to_payload<T: Serialize>(contract: &T) -> QueueResult<Value> {
    serde_json::to_value(contract).map_err(|e| QueueError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_webhook_job_keys_on_webhook_id() {
        let job = WebhookJob::new("evt_77").into_job().unwrap();

        assert_eq!(job.kind, JobKind::Webhook);
        assert_eq!(job.payload, json!({ "webhookId": "evt_77" }));
        assert_eq!(job.idempotency_key.as_deref(), Some("evt_77"));
    }

    #[test]
    fn test_booking_payload_uses_camel_case() {
        let booking: BookingJob = serde_json::from_value(json!({
            "idempotencyKey": "bk-9",
            "weekId": 3,
            "userId": 41,
            "reservations": [{ "roomId": 12 }],
            "checkIn": "2026-12-20",
            "checkOut": "2026-12-27",
            "totalPrice": 980.0
        }))
        .unwrap();

        assert_eq!(booking.check_in, NaiveDate::from_ymd_opt(2026, 12, 20));
        let job = booking.into_job().unwrap();
        assert_eq!(job.idempotency_key.as_deref(), Some("bk-9"));
        assert_eq!(job.payload["weekId"], 3);
        assert_eq!(job.payload["checkOut"], "2026-12-27");
    }

    #[test]
    fn test_booking_without_key_has_no_idempotency_key() {
        let job = BookingJob {
            week_id: Some(1),
            ..BookingJob::default()
        }
        .into_job()
        .unwrap();

        assert!(job.idempotency_key.is_none());
        assert_eq!(job.payload, json!({ "weekId": 1 }));
    }
}
