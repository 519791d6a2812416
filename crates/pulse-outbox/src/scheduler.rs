//! Flush scheduling.
//!
//! Drain passes run on a fixed interval, when the network comes back, and on
//! request. At most one pass runs at a time; a request that arrives while a
//! pass is running is coalesced into it.

use crate::{DeliveryEngine, DrainReport, OutboxResult};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Pending trigger requests kept while the worker is busy.
const TRIGGER_CAPACITY: usize = 8;

/// Why a drain pass was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Interval,
    ConnectivityRestored,
    Foreground,
    Manual,
}

/// Single-flight drain pass scheduler.
///
/// # Lifecycle
///
/// 1. Create with [`FlushScheduler::new`]
/// 2. Call [`start`](Self::start) to spawn the background worker
/// 3. Nudge it with [`request_flush`](Self::request_flush) or run a pass
///    directly with [`flush_now`](Self::flush_now)
/// 4. Stop it with [`shutdown`](Self::shutdown)
pub struct FlushScheduler {
    engine: Arc<DeliveryEngine>,
    interval: Duration,
    /// Held for the duration of a pass.
    pass_lock: tokio::sync::Mutex<()>,
    trigger_tx: mpsc::Sender<FlushTrigger>,
    trigger_rx: Mutex<Option<mpsc::Receiver<FlushTrigger>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl FlushScheduler {
    pub fn new(engine: Arc<DeliveryEngine>, interval: Duration) -> Self {
        let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_CAPACITY);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            engine,
            interval,
            pass_lock: tokio::sync::Mutex::new(()),
            trigger_tx,
            trigger_rx: Mutex::new(Some(trigger_rx)),
            shutdown_tx,
        }
    }

    pub fn engine(&self) -> &Arc<DeliveryEngine> {
        &self.engine
    }

    /// Run a drain pass now unless one is already running.
    ///
    /// Returns `Ok(None)` when the request was coalesced into a running pass.
    pub async fn flush_now(&self, trigger: FlushTrigger) -> OutboxResult<Option<DrainReport>> {
        let Ok(_guard) = self.pass_lock.try_lock() else {
            debug!(trigger = ?trigger, "Drain pass already running, coalescing");
            return Ok(None);
        };
        debug!(trigger = ?trigger, "Starting drain pass");
        self.engine.process_queue().await.map(Some)
    }

    /// Ask the background worker for a pass without waiting for it.
    ///
    /// Returns `false` if the request was dropped because enough requests are
    /// already pending.
    pub fn request_flush(&self, trigger: FlushTrigger) -> bool {
        self.trigger_tx.try_send(trigger).is_ok()
    }

    /// Spawn the background worker.
    ///
    /// Returns `None` if the worker was already started.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut triggers = self.trigger_rx.lock().take()?;
        let mut shutdown = self.shutdown_tx.subscribe();
        let mut network = self.engine.connectivity().subscribe();
        let scheduler = Arc::clone(self);

        info!(interval_secs = self.interval.as_secs(), "Starting flush scheduler");

        Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + scheduler.interval, scheduler.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                if *shutdown.borrow() {
                    break;
                }

                let trigger = tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => FlushTrigger::Interval,
                    changed = network.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if !network.borrow_and_update().is_online() {
                            continue;
                        }
                        FlushTrigger::ConnectivityRestored
                    }
                    Some(trigger) = triggers.recv() => trigger,
                };

                if let Err(e) = scheduler.flush_now(trigger).await {
                    warn!(trigger = ?trigger, error = %e, "Drain pass failed");
                }
            }

            info!("Flush scheduler stopped");
        }))
    }

    /// Stop the background worker after any running pass finishes.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }
}
