//! Fail-open lock client
//!
//! Acquisition protocol, per attempt:
//! 1. Read the current record with strong consistency.
//! 2. No record: insert it, conditional on it still being absent.
//! 3. A record: wait out its lease, then overwrite it, conditional on it
//!    being absent or still carrying the fencing token read in step 1.
//!
//! A failed precondition starts a new attempt while the retry budget lasts.

use std::sync::Arc;

use tracing::{debug, info};

use leasehold_common::{LockError, Result, StoreError, current_timestamp_ms};
use leasehold_store::{ItemKey, LockStore};

use crate::config::LockClientConfig;
use crate::id::LockId;
use crate::lease::Lease;
use crate::record::{LockRecord, absent, absent_or_held_with, new_fencing_token};

/// Acquires fail-open leases on a lock table
#[derive(Clone)]
pub struct LockClient {
    store: Arc<dyn LockStore>,
    config: Arc<LockClientConfig>,
    owner_name: String,
}

impl LockClient {
    pub fn new(store: Arc<dyn LockStore>, config: LockClientConfig) -> Result<Self> {
        config.validate()?;
        let owner_name = config.resolved_owner_name();
        Ok(Self {
            store,
            config: Arc::new(config),
            owner_name,
        })
    }

    pub fn config(&self) -> &LockClientConfig {
        &self.config
    }

    pub fn owner_name(&self) -> &str {
        &self.owner_name
    }

    /// Read the stored record for `id` without acquiring it
    pub async fn inspect(&self, id: impl Into<LockId>) -> Result<Option<LockRecord>> {
        let key = self.resolve(&id.into())?;
        match self.store.get(&self.config.table, &key).await? {
            Some(item) => Ok(Some(LockRecord::from_item(&item)?)),
            None => Ok(None),
        }
    }

    /// Acquire the lock for `id`
    ///
    /// Fails with `LockError::AcquisitionExhausted` when every attempt lost
    /// its conditional write; other store failures are returned unchanged.
    pub async fn acquire(&self, id: impl Into<LockId>) -> Result<Lease> {
        let id = id.into();
        let key = self.resolve(&id)?;

        let mut retries = self.config.retry_count;
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.attempt(&key).await {
                Ok(fencing_token) => {
                    info!(lock = %id, attempts, "Lock acquired");
                    return Ok(Lease::start(
                        self.store.clone(),
                        self.config.clone(),
                        self.owner_name.clone(),
                        id,
                        key,
                        fencing_token,
                    ));
                }
                Err(LockError::Storage(StoreError::ConditionFailed)) if retries > 0 => {
                    retries -= 1;
                    debug!(lock = %id, attempts, retries, "Lock contended, retrying");
                }
                Err(LockError::Storage(StoreError::ConditionFailed)) => {
                    return Err(LockError::AcquisitionExhausted {
                        id: id.to_string(),
                        attempts,
                        source: StoreError::ConditionFailed,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn resolve(&self, id: &LockId) -> Result<ItemKey> {
        id.resolve(&self.config.partition_key, self.config.sort_key.as_deref())
    }

    /// One read-wait-write round; returns the new fencing token
    async fn attempt(&self, key: &ItemKey) -> Result<String> {
        let table = &self.config.table;

        let condition = match self.store.get(table, key).await? {
            None => {
                debug!(key = %key, "No lock record; inserting");
                absent(key)
            }
            Some(item) => {
                let existing = LockRecord::from_item(&item)?;
                let wait = existing
                    .wait_interval(self.config.trust_local_time, current_timestamp_ms())?;
                debug!(
                    key = %key,
                    owner = existing.owner_name.as_deref().unwrap_or("unknown"),
                    wait_ms = wait.as_millis() as u64,
                    "Lock held; waiting out lease"
                );
                tokio::time::sleep(wait).await;
                absent_or_held_with(key, &existing.fencing_token)
            }
        };

        let fencing_token = new_fencing_token();
        let record = LockRecord::new(
            &self.owner_name,
            fencing_token.clone(),
            Some(self.config.lease()),
            self.config.trust_local_time,
        );
        self.store
            .put(table, key, record.to_attributes(), Some(&condition))
            .await?;
        Ok(fencing_token)
    }
}

impl std::fmt::Debug for LockClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockClient")
            .field("config", &self.config)
            .field("owner_name", &self.owner_name)
            .finish_non_exhaustive()
    }
}
