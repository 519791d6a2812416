//! Short-window deduplication of error fingerprints.

use crate::Fingerprint;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Set of recently seen fingerprints, each with an expiry.
///
/// Expired entries are purged lazily on every check. When a Tokio runtime is
/// available, each insert also schedules its own removal so an idle set does
/// not hold on to old fingerprints.
#[derive(Debug, Clone)]
pub struct DedupSet {
    window: Duration,
    entries: Arc<Mutex<HashMap<Fingerprint, Instant>>>,
}

impl DedupSet {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record `fingerprint` if it is not already present.
    ///
    /// Returns `true` for a first sighting, `false` for a duplicate.
    pub fn insert(&self, fingerprint: &Fingerprint) -> bool {
        self.insert_at(fingerprint, Instant::now())
    }

    pub fn insert_at(&self, fingerprint: &Fingerprint, now: Instant) -> bool {
        let expires_at = now + self.window;
        {
            let mut entries = self.entries.lock();
            entries.retain(|_, expiry| *expiry > now);
            if entries.contains_key(fingerprint) {
                return false;
            }
            entries.insert(fingerprint.clone(), expires_at);
        }
        self.schedule_removal(fingerprint.clone(), expires_at);
        true
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        let now = Instant::now();
        self.entries
            .lock()
            .get(fingerprint)
            .is_some_and(|expiry| *expiry > now)
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn schedule_removal(&self, fingerprint: Fingerprint, expires_at: Instant) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let entries = Arc::clone(&self.entries);
        handle.spawn(async move {
            tokio::time::sleep_until(expires_at).await;
            let mut entries = entries.lock();
            // A later insert may have replaced this entry with a fresh expiry.
            if entries.get(&fingerprint).is_some_and(|expiry| *expiry <= Instant::now()) {
                entries.remove(&fingerprint);
                trace!(fingerprint = %fingerprint, "Dedup entry expired");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(300);

    fn fp(message: &str) -> Fingerprint {
        Fingerprint::compute(message, None, None)
    }

    #[test]
    fn test_duplicate_within_window() {
        let set = DedupSet::new(WINDOW);
        let t0 = Instant::now();

        assert!(set.insert_at(&fp("boom"), t0));
        assert!(!set.insert_at(&fp("boom"), t0 + Duration::from_secs(10)));
        assert!(set.insert_at(&fp("other"), t0 + Duration::from_secs(10)));
    }

    #[test]
    fn test_accepted_again_after_window() {
        let set = DedupSet::new(WINDOW);
        let t0 = Instant::now();

        assert!(set.insert_at(&fp("boom"), t0));
        assert!(!set.insert_at(&fp("boom"), t0 + WINDOW - Duration::from_secs(1)));
        assert!(set.insert_at(&fp("boom"), t0 + WINDOW));
    }

    #[test]
    fn test_clear_forgets_everything() {
        let set = DedupSet::new(WINDOW);
        set.insert(&fp("boom"));
        set.clear();
        assert!(set.is_empty());
        assert!(set.insert(&fp("boom")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_is_removed_in_the_background() {
        let set = DedupSet::new(WINDOW);
        assert!(set.insert(&fp("boom")));
        assert!(set.contains(&fp("boom")));

        tokio::time::sleep(WINDOW + Duration::from_secs(1)).await;
        // Let the removal task run.
        tokio::task::yield_now().await;

        assert!(set.is_empty());
    }
}
