//! Common test utilities for lock client integration tests
//!
//! `InstrumentedStore` wraps a `MemoryLockStore` and adds:
//! - call counters
//! - an optional yield after every read, to interleave concurrent acquirers
//! - an optional gate that parks puts until the test releases them
//! - injected delete and read failures

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};

use leasehold_client::{LeaseUnit, LockClientConfig, LockRecord};
use leasehold_common::StoreError;
use leasehold_store::{Condition, Item, ItemKey, LockStore, MemoryLockStore};

pub const TABLE: &str = "locks";
pub const PARTITION_KEY: &str = "id";

#[derive(Default)]
pub struct InstrumentedStore {
    inner: MemoryLockStore,
    pub gets: AtomicUsize,
    pub puts: AtomicUsize,
    pub deletes: AtomicUsize,
    pub condition_failures: AtomicUsize,
    pub yield_after_get: AtomicBool,
    pub fail_gets: AtomicBool,
    pub fail_deletes: AtomicBool,
    put_gate: Mutex<Option<Arc<Semaphore>>>,
    pub put_started: Notify,
}

impl InstrumentedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Park every subsequent put until a permit is added to the returned semaphore
    pub fn gate_puts(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.put_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn open_puts(&self) {
        *self.put_gate.lock() = None;
    }

    /// Write a record directly, bypassing any precondition
    pub async fn seed(&self, key: &ItemKey, record: &LockRecord) {
        self.inner
            .put(TABLE, key, record.to_attributes(), None)
            .await
            .unwrap();
    }

    pub async fn stored(&self, key: &ItemKey) -> Option<LockRecord> {
        self.inner
            .get(TABLE, key)
            .await
            .unwrap()
            .map(|item| LockRecord::from_item(&item).unwrap())
    }

    fn observe<T>(&self, result: Result<T, StoreError>) -> Result<T, StoreError> {
        if matches!(result, Err(StoreError::ConditionFailed)) {
            self.condition_failures.fetch_add(1, Ordering::SeqCst);
        }
        result
    }
}

#[async_trait]
impl LockStore for InstrumentedStore {
    async fn get(&self, table: &str, key: &ItemKey) -> Result<Option<Item>, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected read failure".to_string()));
        }
        let item = self.inner.get(table, key).await;
        if self.yield_after_get.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        item
    }

    async fn put(
        &self,
        table: &str,
        key: &ItemKey,
        attributes: Item,
        condition: Option<&Condition>,
    ) -> Result<(), StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let gate = self.put_gate.lock().clone();
        if let Some(gate) = gate {
            self.put_started.notify_one();
            gate.acquire().await.unwrap().forget();
        }
        let result = self.inner.put(table, key, attributes, condition).await;
        self.observe(result)
    }

    async fn delete(
        &self,
        table: &str,
        key: &ItemKey,
        condition: Option<&Condition>,
    ) -> Result<(), StoreError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Throttled("injected delete failure".to_string()));
        }
        let result = self.inner.delete(table, key, condition).await;
        self.observe(result)
    }
}

pub fn count(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

/// Client configuration with a lease in milliseconds
pub fn config(lease_ms: u64) -> LockClientConfig {
    LockClientConfig::new(TABLE, PARTITION_KEY, lease_ms, LeaseUnit::Milliseconds)
}

pub fn key(id: &str) -> ItemKey {
    ItemKey::new(PARTITION_KEY, id)
}

/// Record as another process would have written it
pub fn foreign_record(
    token: &str,
    lease: Duration,
    acquired_at_local_ms: Option<i64>,
) -> LockRecord {
    LockRecord {
        owner_name: Some("other-host".to_string()),
        fencing_token: token.to_string(),
        lease_duration_ms: Some(lease.as_millis() as u64),
        created_at: None,
        acquired_at_local_ms,
    }
}
