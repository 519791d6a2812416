//! Durable outbox for analytics and error event delivery.
//!
//! This crate provides:
//! - QueueStore: one file per pending delivery, ordered by enqueue time
//! - HttpTransport: POSTs payloads to the collector with bounded timeouts
//! - DeliveryEngine: immediate sends, beacons, and retrying drain passes
//! - FlushScheduler: single-flight drain passes on a timer and on demand
//! - ConnectivityMonitor: host-reported network state

mod connectivity;
mod engine;
mod error;
mod queue;
mod record;
mod scheduler;
mod sender;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

#[cfg(test)]
mod tests;

pub use connectivity::{ConnectivityMonitor, NetworkState};
pub use engine::{
    DeliveryDisposition, DeliveryEngine, DrainReport, CONNECTIVITY_SETTLE_TIMEOUT,
    DRAIN_BATCH_SIZE, MAX_CONCURRENT_DELIVERIES,
};
pub use error::{OutboxError, OutboxResult};
pub use queue::QueueStore;
pub use record::{QueuedDelivery, MAX_RETRY_COUNT};
pub use scheduler::{FlushScheduler, FlushTrigger};
pub use sender::{HttpTransport, SendOutcome, SenderConfig, Transport, API_KEY_HEADER};
