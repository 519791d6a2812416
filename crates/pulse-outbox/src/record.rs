//! Pending delivery records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Failed redeliveries after which a record is discarded.
pub const MAX_RETRY_COUNT: u32 = 3;

/// A payload waiting to be delivered to the collector.
///
/// Everything except the retry count is fixed at creation. Retries produce a
/// new value through [`with_incremented_retry`](Self::with_incremented_retry)
/// rather than mutating a shared record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedDelivery {
    id: String,
    endpoint: String,
    #[serde(with = "payload_base64")]
    payload: Vec<u8>,
    enqueued_at: DateTime<Utc>,
    retry_count: u32,
}

impl QueuedDelivery {
    /// Create a record for `endpoint` stamped with the current time.
    pub fn new(endpoint: impl Into<String>, payload: Vec<u8>) -> Self {
        Self::new_at(endpoint, payload, Utc::now())
    }

    /// Create a record with an explicit enqueue time.
    pub fn new_at(endpoint: impl Into<String>, payload: Vec<u8>, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            endpoint: endpoint.into(),
            payload,
            enqueued_at,
            retry_count: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Copy of this record after one more failed delivery.
    pub fn with_incremented_retry(&self) -> Self {
        Self {
            retry_count: self.retry_count.saturating_add(1).min(MAX_RETRY_COUNT),
            ..self.clone()
        }
    }

    /// Whether the record has used up its retries.
    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= MAX_RETRY_COUNT
    }
}

mod payload_base64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_starts_fresh() {
        let record = QueuedDelivery::new("/api/track/event", b"{}".to_vec());
        assert_eq!(record.retry_count(), 0);
        assert!(!record.is_exhausted());
        assert_eq!(record.endpoint(), "/api/track/event");
        assert!(uuid::Uuid::parse_str(record.id()).is_ok());
    }

    #[test]
    fn test_incremented_retry_is_a_copy() {
        let record = QueuedDelivery::new("/api/track/event", b"{}".to_vec());
        let retried = record.with_incremented_retry();

        assert_eq!(record.retry_count(), 0);
        assert_eq!(retried.retry_count(), 1);
        assert_eq!(retried.id(), record.id());
        assert_eq!(retried.payload(), record.payload());
        assert_eq!(retried.enqueued_at(), record.enqueued_at());
    }

    #[test]
    fn test_retry_count_caps_at_max() {
        let mut record = QueuedDelivery::new("/api/track/event", vec![]);
        for _ in 0..10 {
            record = record.with_incremented_retry();
        }
        assert_eq!(record.retry_count(), MAX_RETRY_COUNT);
        assert!(record.is_exhausted());
    }

    #[test]
    fn test_payload_is_base64_on_disk() {
        let record = QueuedDelivery::new("/api/track/errors?apiKey=pk", vec![0, 159, 146, 150]);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["payload"], "AJ+Slg==");
        assert_eq!(json["retryCount"], 0);
        assert_eq!(json["endpoint"], "/api/track/errors?apiKey=pk");

        let decoded: QueuedDelivery = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, record);
    }
}
