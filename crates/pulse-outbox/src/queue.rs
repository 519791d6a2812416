//! File-per-record durable queue.

use crate::{OutboxError, OutboxResult, QueuedDelivery};
use parking_lot::Mutex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const RECORD_EXTENSION: &str = "json";

/// Durable store of pending deliveries.
///
/// Each record lives in `<dir>/<id>.json`. Order is rebuilt from each
/// record's enqueue timestamp on every read, so it survives restarts and does
/// not depend on directory iteration order.
///
/// Mutations are serialized by `lock`, so an `update` can never recreate a
/// record that a concurrent `remove`, `prune` or `reset_all` just deleted.
#[derive(Debug)]
pub struct QueueStore {
    dir: PathBuf,
    max_size: usize,
    lock: Mutex<()>,
}

impl QueueStore {
    /// Open (and create if needed) the queue directory.
    pub fn open(dir: impl Into<PathBuf>, max_size: usize) -> OutboxResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            max_size,
            lock: Mutex::new(()),
        })
    }

    /// Queue directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cap applied after every enqueue.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Persist a new record, best-effort.
    ///
    /// Storage failures are logged and the record is dropped. Returns whether
    /// the record was written.
    pub fn enqueue(&self, record: &QueuedDelivery) -> bool {
        match self.try_enqueue(record) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    record_id = %record.id(),
                    endpoint = %record.endpoint(),
                    error = %e,
                    "Failed to persist delivery, dropping it"
                );
                false
            }
        }
    }

    /// Persist a new record and prune to the configured cap.
    ///
    /// Only the write decides the result. A failed prune is logged and the
    /// record stays queued.
    pub fn try_enqueue(&self, record: &QueuedDelivery) -> OutboxResult<()> {
        let path = self.record_path(record.id())?;
        let bytes = serde_json::to_vec(record)?;

        let _guard = self.lock.lock();
        write_atomic(&path, &bytes)?;
        debug!(record_id = %record.id(), endpoint = %record.endpoint(), "Enqueued delivery");

        match self.prune_locked(self.max_size) {
            Ok(0) => {}
            Ok(pruned) => {
                info!(count = pruned, max_size = self.max_size, "Evicted oldest queued deliveries");
            }
            Err(e) => {
                warn!(max_size = self.max_size, error = %e, "Failed to prune delivery queue");
            }
        }
        Ok(())
    }

    /// Up to `limit` records, oldest first. Records stay in the store.
    pub fn dequeue_batch(&self, limit: usize) -> OutboxResult<Vec<QueuedDelivery>> {
        let mut records = self.load_all()?;
        records.truncate(limit);
        Ok(records)
    }

    /// Delete a record. Missing records are not an error.
    pub fn remove(&self, id: &str) -> OutboxResult<()> {
        let path = self.record_path(id)?;
        let _guard = self.lock.lock();
        remove_record(&path)
    }

    /// Overwrite a stored record with the same id.
    ///
    /// Returns `false` without writing if the record is no longer stored, so a
    /// removed record is never brought back.
    pub fn update(&self, record: &QueuedDelivery) -> OutboxResult<bool> {
        let path = self.record_path(record.id())?;
        let bytes = serde_json::to_vec(record)?;

        let _guard = self.lock.lock();
        if !path.exists() {
            return Ok(false);
        }
        write_atomic(&path, &bytes)?;
        Ok(true)
    }

    /// Number of stored records.
    pub fn count(&self) -> OutboxResult<usize> {
        let mut count = 0;
        for entry in fs::read_dir(&self.dir)? {
            if is_record_file(&entry?.path()) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Delete the oldest records until at most `max_size` remain.
    ///
    /// Returns how many records were removed.
    pub fn prune(&self, max_size: usize) -> OutboxResult<usize> {
        let _guard = self.lock.lock();
        self.prune_locked(max_size)
    }

    fn prune_locked(&self, max_size: usize) -> OutboxResult<usize> {
        if self.count()? <= max_size {
            return Ok(0);
        }
        let records = self.load_all()?;
        let excess = records.len().saturating_sub(max_size);
        for record in &records[..excess] {
            remove_record(&self.record_path(record.id())?)?;
        }
        Ok(excess)
    }

    /// Delete every record. Returns how many were removed.
    pub fn reset_all(&self) -> OutboxResult<usize> {
        let _guard = self.lock.lock();
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if is_record_file(&path) || is_temp_file(&path) {
                match fs::remove_file(&path) {
                    Ok(()) => removed += usize::from(is_record_file(&path)),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        info!(count = removed, "Cleared delivery queue");
        Ok(removed)
    }

    /// Every readable record, oldest first. Unreadable files are deleted.
    fn load_all(&self) -> OutboxResult<Vec<QueuedDelivery>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !is_record_file(&path) {
                continue;
            }
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                // Removed between listing and reading.
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            match serde_json::from_slice::<QueuedDelivery>(&bytes) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Deleting unreadable queue record");
                    let _ = fs::remove_file(&path);
                }
            }
        }
        records.sort_by(|a, b| {
            a.enqueued_at()
                .cmp(&b.enqueued_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        Ok(records)
    }

    fn record_path(&self, id: &str) -> OutboxResult<PathBuf> {
        validate_record_id(id)?;
        Ok(self.dir.join(format!("{id}.{RECORD_EXTENSION}")))
    }
}

/// Rejects ids that are unsafe as file names: empty, containing separators or
/// NUL, or starting with a dot.
fn validate_record_id(id: &str) -> OutboxResult<()> {
    if id.is_empty()
        || id.starts_with('.')
        || id.contains('/')
        || id.contains('\\')
        || id.contains('\0')
    {
        return Err(OutboxError::InvalidRecordId(id.to_string()));
    }
    Ok(())
}

fn is_record_file(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(RECORD_EXTENSION)
}

fn is_temp_file(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("tmp")
}

fn remove_record(path: &Path) -> OutboxResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Write-to-temp-then-rename so readers never see a partial record.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension(format!("{RECORD_EXTENSION}.tmp"));
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    fn record_at(secs: i64) -> QueuedDelivery {
        let ts = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        QueuedDelivery::new_at("/api/track/event", format!("{{\"n\":{secs}}}").into_bytes(), ts)
    }

    #[test]
    fn test_round_trip_preserves_fields() {
        let dir = tempdir().unwrap();
        let store = QueueStore::open(dir.path(), 1000).unwrap();
        let record = QueuedDelivery::new("/api/track/custom-event", b"{\"name\":\"signup\"}".to_vec());

        assert!(store.enqueue(&record));
        let batch = store.dequeue_batch(10).unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id(), record.id());
        assert_eq!(batch[0].endpoint(), record.endpoint());
        assert_eq!(batch[0].payload(), record.payload());
        assert_eq!(batch[0].retry_count(), 0);
    }

    #[test]
    fn test_dequeue_is_oldest_first_and_non_destructive() {
        let dir = tempdir().unwrap();
        let store = QueueStore::open(dir.path(), 1000).unwrap();
        for secs in [30, 10, 20] {
            store.enqueue(&record_at(secs));
        }

        let batch = store.dequeue_batch(2).unwrap();
        let times: Vec<_> = batch.iter().map(|r| r.enqueued_at()).collect();
        assert_eq!(times, vec![record_at(10).enqueued_at(), record_at(20).enqueued_at()]);
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn test_order_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = QueueStore::open(dir.path(), 1000).unwrap();
            store.enqueue(&record_at(5));
            store.enqueue(&record_at(1));
        }
        let reopened = QueueStore::open(dir.path(), 1000).unwrap();
        let batch = reopened.dequeue_batch(10).unwrap();
        assert_eq!(batch[0].enqueued_at(), record_at(1).enqueued_at());
        assert_eq!(batch[1].enqueued_at(), record_at(5).enqueued_at());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = QueueStore::open(dir.path(), 1000).unwrap();
        let record = record_at(0);
        store.enqueue(&record);

        store.remove(record.id()).unwrap();
        store.remove(record.id()).unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_update_overwrites_existing_only() {
        let dir = tempdir().unwrap();
        let store = QueueStore::open(dir.path(), 1000).unwrap();
        let record = record_at(0);
        store.enqueue(&record);

        assert!(store.update(&record.with_incremented_retry()).unwrap());
        assert_eq!(store.dequeue_batch(1).unwrap()[0].retry_count(), 1);

        store.remove(record.id()).unwrap();
        assert!(!store.update(&record.with_incremented_retry()).unwrap());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_prune_removes_exactly_the_oldest() {
        let dir = tempdir().unwrap();
        // Cap above the fill level so enqueue does not prune on its own.
        let store = QueueStore::open(dir.path(), 1000).unwrap();
        let records: Vec<_> = (0..105).map(record_at).collect();
        for record in &records {
            store.enqueue(record);
        }

        assert_eq!(store.prune(100).unwrap(), 5);
        assert_eq!(store.count().unwrap(), 100);

        let remaining: Vec<_> = store
            .dequeue_batch(1000)
            .unwrap()
            .into_iter()
            .map(|r| r.id().to_string())
            .collect();
        let newest: Vec<_> = records[5..].iter().map(|r| r.id().to_string()).collect();
        assert_eq!(remaining, newest);
    }

    #[test]
    fn test_prune_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = QueueStore::open(dir.path(), 1000).unwrap();
        for secs in 0..12 {
            store.enqueue(&record_at(secs));
        }

        store.prune(10).unwrap();
        let after_first = store.count().unwrap();
        assert_eq!(store.prune(10).unwrap(), 0);
        assert_eq!(store.count().unwrap(), after_first);
    }

    #[test]
    fn test_enqueue_enforces_max_size() {
        let dir = tempdir().unwrap();
        let store = QueueStore::open(dir.path(), 3).unwrap();
        let base = Utc::now();
        let records: Vec<_> = (0..5)
            .map(|i| QueuedDelivery::new_at("/api/track/event", vec![i], base + Duration::seconds(i as i64)))
            .collect();
        for record in &records {
            store.enqueue(record);
        }

        assert_eq!(store.count().unwrap(), 3);
        let ids: Vec<_> = store
            .dequeue_batch(10)
            .unwrap()
            .into_iter()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(ids, vec![records[2].id(), records[3].id(), records[4].id()]);
    }

    #[test]
    fn test_reset_all() {
        let dir = tempdir().unwrap();
        let store = QueueStore::open(dir.path(), 1000).unwrap();
        for secs in 0..4 {
            store.enqueue(&record_at(secs));
        }
        assert_eq!(store.reset_all().unwrap(), 4);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_enqueue_keeps_record_when_prune_fails() {
        let dir = tempdir().unwrap();
        let store = QueueStore::open(dir.path(), 1).unwrap();
        // Counts as a record but cannot be read, so pruning errors out.
        fs::create_dir(dir.path().join("stuck.json")).unwrap();

        let record = record_at(0);
        assert!(store.enqueue(&record));
        assert!(dir.path().join(format!("{}.json", record.id())).exists());
    }

    #[test]
    fn test_update_never_resurrects_concurrently_removed_records() {
        let dir = tempdir().unwrap();
        let store = std::sync::Arc::new(QueueStore::open(dir.path(), 1000).unwrap());

        for _ in 0..50 {
            let record = QueuedDelivery::new("/api/track/event", b"{}".to_vec());
            assert!(store.enqueue(&record));

            let updater = {
                let store = store.clone();
                let retried = record.with_incremented_retry();
                std::thread::spawn(move || store.update(&retried).unwrap())
            };
            store.remove(record.id()).unwrap();
            updater.join().unwrap();

            assert_eq!(store.count().unwrap(), 0);
        }
    }

    #[test]
    fn test_unreadable_record_is_dropped_on_read() {
        let dir = tempdir().unwrap();
        let store = QueueStore::open(dir.path(), 1000).unwrap();
        store.enqueue(&record_at(0));
        fs::write(dir.path().join("garbage.json"), b"not json").unwrap();

        let batch = store.dequeue_batch(10).unwrap();
        assert_eq!(batch.len(), 1);
        assert!(!dir.path().join("garbage.json").exists());
    }

    #[test]
    fn test_enqueue_into_missing_directory_is_best_effort() {
        let dir = tempdir().unwrap();
        let queue_dir = dir.path().join("queue");
        let store = QueueStore::open(&queue_dir, 1000).unwrap();
        fs::remove_dir_all(&queue_dir).unwrap();

        assert!(!store.enqueue(&record_at(0)));
    }

    #[test]
    fn test_rejects_unsafe_ids() {
        assert!(validate_record_id("").is_err());
        assert!(validate_record_id("../escape").is_err());
        assert!(validate_record_id(".hidden").is_err());
        assert!(validate_record_id("a\\b").is_err());
        assert!(validate_record_id("0b7c2f8e-0000-4000-8000-000000000000").is_ok());
    }
}
