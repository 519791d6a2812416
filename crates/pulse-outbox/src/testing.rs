//! Test doubles for code that depends on a [`Transport`].

use crate::{SendOutcome, Transport};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// One request seen by a [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub endpoint: String,
    pub payload: Vec<u8>,
}

impl RecordedRequest {
    /// Payload parsed as JSON.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

/// [`Transport`] that records requests and replays scripted outcomes.
///
/// Scripted outcomes are consumed in order; once they run out every request
/// gets the default outcome. [`hold`](Self::hold) parks requests until
/// [`release`](Self::release), which lets tests observe in-flight passes.
pub struct ScriptedTransport {
    requests: Mutex<Vec<RecordedRequest>>,
    script: Mutex<VecDeque<SendOutcome>>,
    default: Mutex<SendOutcome>,
    latency: Mutex<Duration>,
    gate: watch::Sender<bool>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(default: SendOutcome) -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            requests: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            default: Mutex::new(default),
            latency: Mutex::new(Duration::ZERO),
            gate,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Every request answers 200.
    pub fn succeeding() -> Self {
        Self::new(SendOutcome::Delivered { status: 200 })
    }

    /// Every request fails at the transport level.
    pub fn failing() -> Self {
        Self::new(SendOutcome::Failed("connection refused".to_string()))
    }

    pub fn push_outcome(&self, outcome: SendOutcome) {
        self.script.lock().push_back(outcome);
    }

    pub fn set_default(&self, outcome: SendOutcome) {
        *self.default.lock() = outcome;
    }

    /// Delay applied to every request.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Park requests until [`release`](Self::release).
    pub fn hold(&self) {
        self.gate.send_replace(true);
    }

    pub fn release(&self) {
        self.gate.send_replace(false);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Highest number of requests that were in flight together.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` requests were seen.
    pub async fn wait_for_requests(&self, count: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            while self.request_count() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .is_ok()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post(&self, endpoint: &str, payload: &[u8]) -> SendOutcome {
        self.requests.lock().push(RecordedRequest {
            endpoint: endpoint.to_string(),
            payload: payload.to_vec(),
        });

        let scripted = self.script.lock().pop_front();

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let mut gate = self.gate.subscribe();
        while *gate.borrow_and_update() {
            if gate.changed().await.is_err() {
                break;
            }
        }

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        scripted.unwrap_or_else(|| self.default.lock().clone())
    }
}
