//! Delivery engine: immediate sends, beacons, and drain passes.

use crate::{
    ConnectivityMonitor, NetworkState, OutboxResult, QueueStore, QueuedDelivery, SendOutcome,
    Transport,
};
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Records read from the store per drain pass.
pub const DRAIN_BATCH_SIZE: usize = 50;

/// Requests in flight at once during a drain pass.
pub const MAX_CONCURRENT_DELIVERIES: usize = 4;

/// How long a send waits for a transitioning network to settle.
pub const CONNECTIVITY_SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// What happened to a payload handed to [`DeliveryEngine::deliver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryDisposition {
    /// The collector accepted it.
    Sent,
    /// It is in the durable queue awaiting a drain pass.
    Queued,
    /// It could not be sent or stored.
    Dropped,
}

/// Summary of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub attempted: usize,
    pub delivered: usize,
    pub retried: usize,
    pub discarded: usize,
}

enum RecordResult {
    Delivered,
    Retried,
    Discarded,
}

/// Sends payloads and redelivers queued records.
pub struct DeliveryEngine {
    store: Arc<QueueStore>,
    transport: Arc<dyn Transport>,
    connectivity: ConnectivityMonitor,
}

impl DeliveryEngine {
    pub fn new(
        store: Arc<QueueStore>,
        transport: Arc<dyn Transport>,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        Self {
            store,
            transport,
            connectivity,
        }
    }

    pub fn store(&self) -> &Arc<QueueStore> {
        &self.store
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    /// One POST attempt.
    ///
    /// Waits for a transitioning network to settle first. Offline yields a
    /// failure without touching the network.
    pub async fn send_immediate(&self, endpoint: &str, payload: &[u8]) -> SendOutcome {
        let state = self
            .connectivity
            .wait_until_settled(CONNECTIVITY_SETTLE_TIMEOUT)
            .await;
        if !state.is_online() {
            return SendOutcome::Failed("offline".to_string());
        }
        self.transport.post(endpoint, payload).await
    }

    /// Send now, falling back to the durable queue.
    pub async fn deliver(&self, endpoint: &str, payload: Vec<u8>) -> DeliveryDisposition {
        if self.connectivity.current() == NetworkState::Offline {
            debug!(endpoint = %endpoint, "Offline, queueing payload");
            return self.queue_payload(endpoint, payload);
        }

        match self.send_immediate(endpoint, &payload).await {
            SendOutcome::Delivered { status } => {
                debug!(endpoint = %endpoint, status = status, "Payload delivered");
                DeliveryDisposition::Sent
            }
            outcome => {
                debug!(endpoint = %endpoint, outcome = ?outcome, "Send failed, queueing payload");
                self.queue_payload(endpoint, payload)
            }
        }
    }

    /// Fire-and-forget [`deliver`](Self::deliver).
    ///
    /// A failed beacon is queued under its own endpoint and retried like any
    /// other record.
    pub fn send_beacon(self: &Arc<Self>, endpoint: String, payload: Vec<u8>) -> JoinHandle<DeliveryDisposition> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.deliver(&endpoint, payload).await })
    }

    /// Store a payload for a later drain pass.
    pub fn queue_payload(&self, endpoint: &str, payload: Vec<u8>) -> DeliveryDisposition {
        let record = QueuedDelivery::new(endpoint, payload);
        if self.store.enqueue(&record) {
            DeliveryDisposition::Queued
        } else {
            DeliveryDisposition::Dropped
        }
    }

    /// Attempt every record in the oldest batch.
    ///
    /// Success removes the record. Failure stores it with one more retry, or
    /// removes it once its retries are used up. One failure does not stop the
    /// rest of the batch. Skipped entirely while offline.
    pub async fn process_queue(&self) -> OutboxResult<DrainReport> {
        let state = self
            .connectivity
            .wait_until_settled(CONNECTIVITY_SETTLE_TIMEOUT)
            .await;
        if !state.is_online() {
            debug!("Offline, skipping drain pass");
            return Ok(DrainReport::default());
        }

        let batch = self.store.dequeue_batch(DRAIN_BATCH_SIZE)?;
        if batch.is_empty() {
            return Ok(DrainReport::default());
        }

        let mut report = DrainReport {
            attempted: batch.len(),
            ..DrainReport::default()
        };

        let results: Vec<RecordResult> = stream::iter(batch)
            .map(|record| self.redeliver(record))
            .buffer_unordered(MAX_CONCURRENT_DELIVERIES)
            .collect()
            .await;

        for result in results {
            match result {
                RecordResult::Delivered => report.delivered += 1,
                RecordResult::Retried => report.retried += 1,
                RecordResult::Discarded => report.discarded += 1,
            }
        }

        info!(
            attempted = report.attempted,
            delivered = report.delivered,
            retried = report.retried,
            discarded = report.discarded,
            "Drain pass finished"
        );
        Ok(report)
    }

    async fn redeliver(&self, record: QueuedDelivery) -> RecordResult {
        let outcome = self.transport.post(record.endpoint(), record.payload()).await;

        if outcome.is_success() {
            if let Err(e) = self.store.remove(record.id()) {
                warn!(record_id = %record.id(), error = %e, "Failed to remove delivered record");
            }
            return RecordResult::Delivered;
        }

        let retried = record.with_incremented_retry();
        if retried.is_exhausted() {
            warn!(
                record_id = %record.id(),
                endpoint = %record.endpoint(),
                outcome = ?outcome,
                "Retries exhausted, discarding record"
            );
            if let Err(e) = self.store.remove(record.id()) {
                warn!(record_id = %record.id(), error = %e, "Failed to remove exhausted record");
            }
            return RecordResult::Discarded;
        }

        debug!(
            record_id = %record.id(),
            retry_count = retried.retry_count(),
            outcome = ?outcome,
            "Redelivery failed"
        );
        if let Err(e) = self.store.update(&retried) {
            warn!(record_id = %record.id(), error = %e, "Failed to persist retry count");
        }
        RecordResult::Retried
    }
}
