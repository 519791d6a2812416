//! Drain pass behavior.

use super::harness::TestHarness;
use crate::testing::ScriptedTransport;
use crate::{SendOutcome, DRAIN_BATCH_SIZE, MAX_CONCURRENT_DELIVERIES};
use std::time::Duration;

#[tokio::test]
async fn successful_pass_empties_the_store() {
    let h = TestHarness::online(ScriptedTransport::succeeding());
    h.seed(3);

    let report = h.engine.process_queue().await.unwrap();

    assert_eq!(report.attempted, 3);
    assert_eq!(report.delivered, 3);
    assert_eq!(h.store.count().unwrap(), 0);
}

#[tokio::test]
async fn failed_record_is_updated_with_one_more_retry() {
    let h = TestHarness::online(ScriptedTransport::failing());
    let record = h.seed_with_retries(0);

    let report = h.engine.process_queue().await.unwrap();

    assert_eq!(report.retried, 1);
    let stored = h.store.dequeue_batch(1).unwrap();
    assert_eq!(stored[0].id(), record.id());
    assert_eq!(stored[0].retry_count(), 1);
}

#[tokio::test]
async fn record_at_two_retries_is_removed_on_next_failure() {
    let h = TestHarness::online(ScriptedTransport::failing());
    h.seed_with_retries(2);

    let report = h.engine.process_queue().await.unwrap();

    assert_eq!(report.discarded, 1);
    assert_eq!(report.retried, 0);
    assert_eq!(h.store.count().unwrap(), 0);
}

#[tokio::test]
async fn retry_count_never_exceeds_cap_across_passes() {
    let h = TestHarness::online(ScriptedTransport::failing());
    let record = h.seed_with_retries(0);

    for _ in 0..5 {
        h.engine.process_queue().await.unwrap();
        for stored in h.store.dequeue_batch(10).unwrap() {
            assert!(stored.retry_count() < 3);
        }
    }

    // Three failed attempts, then gone for good.
    assert_eq!(h.transport.request_count(), 3);
    assert!(h
        .store
        .dequeue_batch(10)
        .unwrap()
        .iter()
        .all(|r| r.id() != record.id()));
}

#[tokio::test]
async fn one_failure_does_not_stop_the_pass() {
    let h = TestHarness::online(ScriptedTransport::succeeding());
    h.seed(3);
    h.transport.push_outcome(SendOutcome::Rejected { status: 500 });

    let report = h.engine.process_queue().await.unwrap();

    assert_eq!(report.attempted, 3);
    assert_eq!(report.delivered, 2);
    assert_eq!(report.retried, 1);
    assert_eq!(h.store.count().unwrap(), 1);
}

#[tokio::test]
async fn pass_reads_at_most_one_batch() {
    let h = TestHarness::online(ScriptedTransport::succeeding());
    h.seed(DRAIN_BATCH_SIZE + 7);

    let report = h.engine.process_queue().await.unwrap();

    assert_eq!(report.attempted, DRAIN_BATCH_SIZE);
    assert_eq!(h.store.count().unwrap(), 7);
}

#[tokio::test]
async fn pass_attempts_oldest_records_first() {
    let h = TestHarness::online(ScriptedTransport::succeeding());
    h.seed(DRAIN_BATCH_SIZE + 2);

    h.engine.process_queue().await.unwrap();

    let remaining: Vec<_> = h
        .store
        .dequeue_batch(10)
        .unwrap()
        .iter()
        .map(|r| String::from_utf8(r.payload().to_vec()).unwrap())
        .collect();
    let expected: Vec<_> = (DRAIN_BATCH_SIZE..DRAIN_BATCH_SIZE + 2)
        .map(|i| format!("{{\"seq\":{i}}}"))
        .collect();
    assert_eq!(remaining, expected);
}

#[tokio::test(start_paused = true)]
async fn fan_out_is_bounded() {
    let h = TestHarness::online(ScriptedTransport::succeeding());
    h.transport.set_latency(Duration::from_millis(50));
    h.seed(12);

    let report = h.engine.process_queue().await.unwrap();

    assert_eq!(report.delivered, 12);
    assert_eq!(h.transport.max_in_flight(), MAX_CONCURRENT_DELIVERIES);
}

#[tokio::test]
async fn reset_during_pass_is_not_undone_by_failed_attempts() {
    let h = TestHarness::online(ScriptedTransport::failing());
    h.seed(3);
    h.transport.hold();

    let running = {
        let engine = h.engine.clone();
        tokio::spawn(async move { engine.process_queue().await })
    };
    assert!(h.transport.wait_for_requests(3, Duration::from_secs(5)).await);

    assert_eq!(h.store.reset_all().unwrap(), 3);
    h.transport.release();
    let report = running.await.unwrap().unwrap();

    assert_eq!(report.attempted, 3);
    assert_eq!(h.store.count().unwrap(), 0);
}

#[tokio::test]
async fn prune_during_pass_is_not_undone_by_failed_attempts() {
    let h = TestHarness::online(ScriptedTransport::failing());
    let seeded = h.seed(2);
    h.transport.hold();

    let running = {
        let engine = h.engine.clone();
        tokio::spawn(async move { engine.process_queue().await })
    };
    assert!(h.transport.wait_for_requests(2, Duration::from_secs(5)).await);

    assert_eq!(h.store.prune(1).unwrap(), 1);
    h.transport.release();
    running.await.unwrap().unwrap();

    let remaining = h.store.dequeue_batch(10).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id(), seeded[1].id());
    assert_eq!(remaining[0].retry_count(), 1);
}
