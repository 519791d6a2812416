//! Host-reported network state.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Network reachability as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    Online,
    Offline,
    /// Interfaces are changing; wait before deciding.
    Transitioning,
}

impl NetworkState {
    pub fn is_online(self) -> bool {
        self == Self::Online
    }
}

/// Shared view of the current [`NetworkState`].
///
/// Cloning is cheap; every clone observes the same state.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    state: Arc<watch::Sender<NetworkState>>,
}

impl ConnectivityMonitor {
    pub fn new(initial: NetworkState) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            state: Arc::new(state),
        }
    }

    /// Report a new state. Subscribers are only woken on actual changes.
    pub fn set_state(&self, next: NetworkState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            info!(state = ?next, "Network state changed");
        }
    }

    pub fn current(&self) -> NetworkState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<NetworkState> {
        self.state.subscribe()
    }

    /// Wait until the state is not [`NetworkState::Transitioning`].
    ///
    /// Returns `Offline` if the state is still transitioning when `timeout`
    /// elapses.
    pub async fn wait_until_settled(&self, timeout: Duration) -> NetworkState {
        let mut rx = self.subscribe();
        let settled = tokio::time::timeout(timeout, async {
            loop {
                let state = *rx.borrow_and_update();
                if state != NetworkState::Transitioning {
                    return state;
                }
                if rx.changed().await.is_err() {
                    return state;
                }
            }
        })
        .await;

        match settled {
            Ok(state) => state,
            Err(_) => {
                debug!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Network still transitioning, treating as offline"
                );
                NetworkState::Offline
            }
        }
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(NetworkState::Online)
    }
}
