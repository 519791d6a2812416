//! Combined rate and dedup check for error events.

use crate::{DedupSet, Fingerprint, RateWindow};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Guard settings.
#[derive(Debug, Clone)]
pub struct IntakeGuardConfig {
    /// Accepted events allowed per window.
    pub max_events: usize,
    pub rate_window: Duration,
    /// How long an identical fingerprint stays suppressed.
    pub dedup_window: Duration,
    pub dedup_enabled: bool,
}

impl Default for IntakeGuardConfig {
    fn default() -> Self {
        Self {
            max_events: 10,
            rate_window: Duration::from_secs(60),
            dedup_window: Duration::from_secs(300),
            dedup_enabled: true,
        }
    }
}

/// Verdict for one arriving event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeDecision {
    Accepted,
    RateLimited,
    Duplicate,
}

/// Rate limit then dedup, both required to pass.
#[derive(Debug)]
pub struct IntakeGuard {
    rate: RateWindow,
    dedup: Option<DedupSet>,
}

impl IntakeGuard {
    pub fn new(config: IntakeGuardConfig) -> Self {
        Self {
            rate: RateWindow::new(config.max_events, config.rate_window),
            dedup: config
                .dedup_enabled
                .then(|| DedupSet::new(config.dedup_window)),
        }
    }

    pub fn admit(&self, fingerprint: &Fingerprint) -> IntakeDecision {
        self.admit_at(fingerprint, Instant::now())
    }

    pub fn admit_at(&self, fingerprint: &Fingerprint, now: Instant) -> IntakeDecision {
        if !self.rate.try_acquire_at(now) {
            debug!(fingerprint = %fingerprint, "Error event rate limited");
            return IntakeDecision::RateLimited;
        }

        if let Some(dedup) = &self.dedup {
            if !dedup.insert_at(fingerprint, now) {
                debug!(fingerprint = %fingerprint, "Duplicate error event suppressed");
                return IntakeDecision::Duplicate;
            }
        }

        IntakeDecision::Accepted
    }

    /// Forget recent fingerprints and rate history.
    pub fn reset(&self) {
        self.rate.clear();
        if let Some(dedup) = &self.dedup {
            dedup.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(max_events: usize, dedup_enabled: bool) -> IntakeGuard {
        IntakeGuard::new(IntakeGuardConfig {
            max_events,
            rate_window: Duration::from_secs(60),
            dedup_window: Duration::from_secs(300),
            dedup_enabled,
        })
    }

    #[test]
    fn test_sixth_event_in_a_second_is_rate_limited() {
        let guard = guard(5, false);
        let t0 = Instant::now();
        let same = Fingerprint::compute("boom", None, None);

        let decisions: Vec<_> = (0..6)
            .map(|i| guard.admit_at(&same, t0 + Duration::from_millis(i * 150)))
            .collect();

        assert_eq!(&decisions[..5], &[IntakeDecision::Accepted; 5]);
        assert_eq!(decisions[5], IntakeDecision::RateLimited);
    }

    #[test]
    fn test_distinct_fingerprints_share_the_rate_limit() {
        let guard = guard(5, true);
        let t0 = Instant::now();

        for i in 0..5 {
            let fp = Fingerprint::compute(&format!("error {i}"), None, None);
            assert_eq!(guard.admit_at(&fp, t0), IntakeDecision::Accepted);
        }
        let sixth = Fingerprint::compute("error 5", None, None);
        assert_eq!(guard.admit_at(&sixth, t0), IntakeDecision::RateLimited);
    }

    #[test]
    fn test_identical_errors_deduplicated_until_expiry() {
        let guard = guard(10, true);
        let t0 = Instant::now();
        let fp = Fingerprint::compute("boom", Some("at main"), Some("app.rs:3"));

        assert_eq!(guard.admit_at(&fp, t0), IntakeDecision::Accepted);
        assert_eq!(
            guard.admit_at(&fp, t0 + Duration::from_secs(1)),
            IntakeDecision::Duplicate
        );
        assert_eq!(
            guard.admit_at(&fp, t0 + Duration::from_secs(301)),
            IntakeDecision::Accepted
        );
    }

    #[test]
    fn test_reset_forgets_fingerprints() {
        let guard = guard(10, true);
        let fp = Fingerprint::compute("boom", None, None);

        assert_eq!(guard.admit(&fp), IntakeDecision::Accepted);
        guard.reset();
        assert_eq!(guard.admit(&fp), IntakeDecision::Accepted);
    }
}
