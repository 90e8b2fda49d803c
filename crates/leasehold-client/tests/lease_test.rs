//! Lease renewal and release tests

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{InstrumentedStore, TABLE, config, count, foreign_record, key};
use leasehold_client::record::held_with;
use leasehold_client::{Lease, LockClient, StoreError};
use leasehold_store::LockStore;

async fn acquire(store: &Arc<InstrumentedStore>, heartbeat_ms: Option<u64>) -> Lease {
    let mut config = config(10_000).with_owner_name("holder");
    if let Some(ms) = heartbeat_ms {
        config = config.with_heartbeat_period(Duration::from_millis(ms));
    }
    let client = LockClient::new(store.clone(), config).unwrap();
    client.acquire("job").await.unwrap()
}

// ============== Renewal ==============

#[tokio::test(start_paused = true)]
async fn test_renewals_replace_fencing_token() {
    let store = InstrumentedStore::new();
    let lease = acquire(&store, Some(100)).await;
    let first = lease.fencing_token().await;

    let mut seen = vec![first.clone()];
    tokio::time::sleep(Duration::from_millis(150)).await;
    for _ in 0..3 {
        let current = lease.fencing_token().await;
        let stored = store.stored(&key("job")).await.unwrap();
        assert_eq!(stored.fencing_token, current);
        assert!(!seen.contains(&current), "token {} reused", current);
        seen.push(current);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    // One insert plus one write per renewal
    assert!(count(&store.puts) >= 4);

    // The original token no longer validates
    let stale = held_with(&key("job"), &first);
    let overwrite = foreign_record("X", Duration::from_secs(1), None).to_attributes();
    let err = store
        .put(TABLE, &key("job"), overwrite, Some(&stale))
        .await
        .unwrap_err();
    assert_eq!(err, StoreError::ConditionFailed);

    lease.release().await;
    assert!(store.stored(&key("job")).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_renewal_failure_is_reported_once_and_stops_heartbeat() {
    let store = InstrumentedStore::new();
    let lease = acquire(&store, Some(100)).await;
    let mut failures = lease.take_renewal_failures().unwrap();
    assert!(lease.take_renewal_failures().is_none());

    store
        .seed(&key("job"), &foreign_record("stolen", Duration::from_secs(10), None))
        .await;

    let err = failures.recv().await.unwrap();
    assert!(err.is_condition_failed());
    assert_eq!(err.code(), "StorageError");

    // The heartbeat ended, so the channel closes
    assert!(failures.recv().await.is_none());
    let puts = count(&store.puts);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(count(&store.puts), puts);

    let stored = store.stored(&key("job")).await.unwrap();
    assert_eq!(stored.fencing_token, "stolen");
}

#[tokio::test(start_paused = true)]
async fn test_no_heartbeat_without_period() {
    let store = InstrumentedStore::new();
    let lease = acquire(&store, None).await;
    let mut failures = lease.take_renewal_failures().unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(count(&store.puts), 1);
    assert!(failures.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_drop_stops_heartbeat_without_deleting() {
    let store = InstrumentedStore::new();
    let lease = acquire(&store, Some(100)).await;
    drop(lease);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(count(&store.puts), 1);
    assert_eq!(count(&store.deletes), 0);
    assert!(store.stored(&key("job")).await.is_some());
}

// ============== Release ==============

#[tokio::test]
async fn test_release_is_idempotent() {
    let store = InstrumentedStore::new();
    let lease = acquire(&store, None).await;

    lease.release().await;
    assert!(lease.is_released());
    lease.release().await;

    assert_eq!(count(&store.deletes), 1);
    assert!(store.stored(&key("job")).await.is_none());
}

#[tokio::test]
async fn test_concurrent_releases_issue_one_delete() {
    let store = InstrumentedStore::new();
    let lease = acquire(&store, None).await;

    tokio::join!(lease.release(), lease.release(), lease.release());

    assert_eq!(count(&store.deletes), 1);
    assert!(lease.is_released());
}

#[tokio::test(start_paused = true)]
async fn test_release_waits_for_in_flight_renewal() {
    let store = InstrumentedStore::new();
    let lease = Arc::new(acquire(&store, Some(1000)).await);
    let gate = store.gate_puts();

    // Heartbeat fires and parks inside its write
    store.put_started.notified().await;
    assert!(lease.is_renewing());

    let release = {
        let lease = lease.clone();
        tokio::spawn(async move { lease.release().await })
    };
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(count(&store.deletes), 0);
    assert!(!lease.is_released());

    gate.add_permits(1);
    release.await.unwrap();
    assert!(!lease.is_renewing());

    // The deferred delete used the token the renewal just wrote
    assert_eq!(count(&store.puts), 2);
    assert_eq!(count(&store.deletes), 1);
    assert_eq!(count(&store.condition_failures), 0);
    assert!(store.stored(&key("job")).await.is_none());

    // No renewal after release
    store.open_puts();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(count(&store.puts), 2);
}

#[tokio::test(start_paused = true)]
async fn test_release_after_failed_in_flight_renewal() {
    let store = InstrumentedStore::new();
    let lease = Arc::new(acquire(&store, Some(1000)).await);
    let gate = store.gate_puts();

    store.put_started.notified().await;
    store
        .seed(&key("job"), &foreign_record("other", Duration::from_secs(10), None))
        .await;

    let release = {
        let lease = lease.clone();
        tokio::spawn(async move { lease.release().await })
    };
    tokio::task::yield_now().await;
    assert_eq!(count(&store.deletes), 0);

    gate.add_permits(1);
    release.await.unwrap();

    // Renewal and delete both lost their preconditions
    assert_eq!(count(&store.deletes), 1);
    assert_eq!(count(&store.condition_failures), 2);
    assert!(lease.is_released());

    store.open_puts();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(count(&store.puts), 2);
    let stored = store.stored(&key("job")).await.unwrap();
    assert_eq!(stored.fencing_token, "other");
}

#[tokio::test]
async fn test_release_after_external_overwrite_leaves_record() {
    let store = InstrumentedStore::new();
    let lease = acquire(&store, None).await;

    store
        .seed(&key("job"), &foreign_record("reclaimed", Duration::from_secs(10), None))
        .await;
    lease.release().await;

    assert!(lease.is_released());
    assert_eq!(count(&store.deletes), 1);
    assert_eq!(count(&store.condition_failures), 1);
    let stored = store.stored(&key("job")).await.unwrap();
    assert_eq!(stored.fencing_token, "reclaimed");
}

#[tokio::test]
async fn test_release_suppresses_backend_failure() {
    let store = InstrumentedStore::new();
    let lease = acquire(&store, None).await;
    store.fail_deletes.store(true, Ordering::SeqCst);

    lease.release().await;

    assert!(lease.is_released());
    assert_eq!(count(&store.deletes), 1);
    assert!(store.stored(&key("job")).await.is_some());

    // Not retried
    lease.release().await;
    assert_eq!(count(&store.deletes), 1);
}

#[tokio::test]
async fn test_lease_accessors() {
    let store = InstrumentedStore::new();
    let lease = acquire(&store, None).await;

    assert_eq!(lease.id().to_string(), "job");
    assert_eq!(lease.key(), &key("job"));
    assert_eq!(lease.owner_name(), "holder");
    assert_eq!(lease.lease_duration(), Duration::from_secs(10));
    assert!(!lease.is_released());
    assert!(!lease.is_renewing());
}
