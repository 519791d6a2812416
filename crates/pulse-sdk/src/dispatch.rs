//! Handles returned by event intake calls.

use pulse_outbox::DeliveryDisposition;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;

/// Final result of handing an event to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Delivered to the collector.
    Sent,
    /// Stored in the durable queue for a later drain pass.
    Queued,
    /// Lost: it could neither be encoded, sent, nor stored.
    Dropped,
    /// Suppressed by the error rate limit.
    RateLimited,
    /// Suppressed as a recent duplicate error.
    Duplicate,
    /// Tracking is disabled for this client.
    Disabled,
}

impl From<DeliveryDisposition> for DispatchOutcome {
    fn from(disposition: DeliveryDisposition) -> Self {
        match disposition {
            DeliveryDisposition::Sent => Self::Sent,
            DeliveryDisposition::Queued => Self::Queued,
            DeliveryDisposition::Dropped => Self::Dropped,
        }
    }
}

/// Work handed off by an intake call.
///
/// Dropping it lets the work finish in the background. Awaiting it yields
/// the [`DispatchOutcome`].
#[derive(Debug)]
#[must_use = "drop the handle to fire and forget, or await it for the outcome"]
pub struct PendingDispatch {
    state: State,
}

#[derive(Debug)]
enum State {
    Ready(Option<DispatchOutcome>),
    Running(JoinHandle<DispatchOutcome>),
}

impl PendingDispatch {
    pub(crate) fn ready(outcome: DispatchOutcome) -> Self {
        Self {
            state: State::Ready(Some(outcome)),
        }
    }

    pub(crate) fn running(handle: JoinHandle<DispatchOutcome>) -> Self {
        Self {
            state: State::Running(handle),
        }
    }

    /// Outcome if it was decided without background work.
    pub fn immediate(&self) -> Option<DispatchOutcome> {
        match &self.state {
            State::Ready(outcome) => *outcome,
            State::Running(_) => None,
        }
    }
}

impl Future for PendingDispatch {
    type Output = DispatchOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            State::Ready(outcome) => Poll::Ready(outcome.take().unwrap_or(DispatchOutcome::Dropped)),
            // A task that panicked or was cancelled delivered nothing.
            State::Running(handle) => Pin::new(handle)
                .poll(cx)
                .map(|joined| joined.unwrap_or(DispatchOutcome::Dropped)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ready_outcome_is_immediate() {
        let pending = PendingDispatch::ready(DispatchOutcome::RateLimited);
        assert_eq!(pending.immediate(), Some(DispatchOutcome::RateLimited));
        assert_eq!(pending.await, DispatchOutcome::RateLimited);
    }

    #[tokio::test]
    async fn test_running_outcome_resolves_on_await() {
        let pending = PendingDispatch::running(tokio::spawn(async { DispatchOutcome::Queued }));
        assert_eq!(pending.immediate(), None);
        assert_eq!(pending.await, DispatchOutcome::Queued);
    }

    fn explode() -> DispatchOutcome {
        panic!("encoder blew up")
    }

    #[tokio::test]
    async fn test_panicked_task_counts_as_dropped() {
        let pending = PendingDispatch::running(tokio::spawn(async { explode() }));
        assert_eq!(pending.await, DispatchOutcome::Dropped);
    }
}
