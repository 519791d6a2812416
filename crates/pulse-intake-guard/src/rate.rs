//! Sliding-window rate limiting.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Admits at most `limit` events per sliding `window`.
#[derive(Debug)]
pub struct RateWindow {
    limit: usize,
    window: Duration,
    accepted: Mutex<VecDeque<Instant>>,
}

impl RateWindow {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            accepted: Mutex::new(VecDeque::with_capacity(limit)),
        }
    }

    /// Admit an event arriving now. Admitted events use up capacity.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut accepted = self.accepted.lock();
        while let Some(&oldest) = accepted.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                accepted.pop_front();
            } else {
                break;
            }
        }

        if accepted.len() >= self.limit {
            return false;
        }
        accepted.push_back(now);
        true
    }

    pub fn clear(&self) {
        self.accepted.lock().clear();
    }
}
