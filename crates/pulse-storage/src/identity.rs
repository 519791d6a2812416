//! Visitor and session identity.

use crate::{KeyValueStore, StorageKeys, StorageResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Visitor and session identifiers backed by a [`KeyValueStore`].
///
/// The visitor id is created once and kept until [`reset`](Self::reset). The
/// session id rotates after a period of inactivity; rotation also clears the
/// first-touch referrer so attribution starts over with each session.
#[derive(Clone)]
pub struct IdentityStore {
    store: Arc<dyn KeyValueStore>,
    // Serializes read-then-create so concurrent callers agree on one id.
    lock: Arc<Mutex<()>>,
}

impl IdentityStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Get the visitor id, creating and persisting one on first use.
    pub fn visitor_id(&self) -> StorageResult<String> {
        let _guard = self.lock.lock();
        if let Some(id) = self.store.get(StorageKeys::VISITOR_ID)? {
            return Ok(id);
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.store.set(StorageKeys::VISITOR_ID, &id)?;
        debug!(visitor_id = %id, "Created visitor id");
        Ok(id)
    }

    /// Get the current session id, rotating it if the session has timed out.
    pub fn session_id(&self, timeout: Duration) -> StorageResult<String> {
        self.session_id_at(timeout, Utc::now())
    }

    /// Same as [`session_id`](Self::session_id) with an explicit clock.
    pub fn session_id_at(&self, timeout: Duration, now: DateTime<Utc>) -> StorageResult<String> {
        let _guard = self.lock.lock();
        let current = self.store.get(StorageKeys::SESSION_ID)?;
        let last_access = self
            .store
            .get(StorageKeys::SESSION_LAST_ACCESS)?
            .and_then(|raw| parse_timestamp(&raw));

        let session_id = match (current, last_access) {
            (Some(id), Some(last)) if is_within(last, now, timeout) => id,
            _ => {
                let id = uuid::Uuid::new_v4().to_string();
                self.store.set(StorageKeys::SESSION_ID, &id)?;
                self.store.delete(StorageKeys::ORIGINAL_REFERRER)?;
                debug!(session_id = %id, "Started new session");
                id
            }
        };

        self.store
            .set(StorageKeys::SESSION_LAST_ACCESS, &now.to_rfc3339())?;
        Ok(session_id)
    }

    /// First-touch referrer recorded for the current session.
    pub fn original_referrer(&self) -> StorageResult<Option<String>> {
        self.store.get(StorageKeys::ORIGINAL_REFERRER)
    }

    /// Record a referrer. Only the first referrer of a session is kept.
    ///
    /// Returns whether this call set the original referrer.
    pub fn record_referrer(&self, referrer: &str) -> StorageResult<bool> {
        let _guard = self.lock.lock();
        if self.store.has(StorageKeys::ORIGINAL_REFERRER)? {
            return Ok(false);
        }
        self.store.set(StorageKeys::ORIGINAL_REFERRER, referrer)?;
        Ok(true)
    }

    /// Forget every identifier. The next access creates fresh ones.
    pub fn reset(&self) -> StorageResult<()> {
        let _guard = self.lock.lock();
        for key in StorageKeys::ALL {
            self.store.delete(key)?;
        }
        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            warn!(value = %raw, error = %e, "Ignoring unreadable session timestamp");
            None
        }
    }
}

fn is_within(last: DateTime<Utc>, now: DateTime<Utc>, timeout: Duration) -> bool {
    let Ok(timeout) = chrono::Duration::from_std(timeout) else {
        return true;
    };
    now.signed_duration_since(last) < timeout
}
