//! Fail-closed lock client
//!
//! Locks without a lease: a record stays until its holder deletes it, so a
//! holder that dies keeps the lock held until an operator removes the
//! record. Acquisition polls every acquire period while the retry budget
//! lasts. Release errors are returned to the caller.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use leasehold_common::{LockError, Result, StoreError};
use leasehold_store::{ItemKey, LockStore};

use crate::config::{synthesized_owner_name, validate_key_names, validate_table};
use crate::id::LockId;
use crate::record::{LockRecord, absent, held_with, new_fencing_token};

const DEFAULT_RETRY_COUNT: u32 = 1;

/// Configuration for a `FailClosedLockClient`
#[derive(Debug, Clone)]
pub struct FailClosedConfig {
    pub owner_name: Option<String>,
    pub table: String,
    pub partition_key: String,
    pub sort_key: Option<String>,
    /// Pause between acquisition attempts
    pub acquire_period: Duration,
    pub retry_count: u32,
}

impl FailClosedConfig {
    pub fn new(
        table: impl Into<String>,
        partition_key: impl Into<String>,
        acquire_period: Duration,
    ) -> Self {
        Self {
            owner_name: None,
            table: table.into(),
            partition_key: partition_key.into(),
            sort_key: None,
            acquire_period,
            retry_count: DEFAULT_RETRY_COUNT,
        }
    }

    pub fn with_owner_name(mut self, owner_name: impl Into<String>) -> Self {
        self.owner_name = Some(owner_name.into());
        self
    }

    pub fn with_sort_key(mut self, sort_key: impl Into<String>) -> Self {
        self.sort_key = Some(sort_key.into());
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_table(&self.table)?;
        validate_key_names(&self.partition_key, self.sort_key.as_deref())
    }
}

/// Acquires lease-less locks on a lock table
#[derive(Clone)]
pub struct FailClosedLockClient {
    store: Arc<dyn LockStore>,
    config: Arc<FailClosedConfig>,
    owner_name: String,
}

impl FailClosedLockClient {
    pub fn new(store: Arc<dyn LockStore>, config: FailClosedConfig) -> Result<Self> {
        config.validate()?;
        let owner_name = config
            .owner_name
            .clone()
            .unwrap_or_else(synthesized_owner_name);
        Ok(Self {
            store,
            config: Arc::new(config),
            owner_name,
        })
    }

    pub async fn acquire(&self, id: impl Into<LockId>) -> Result<FailClosedLock> {
        let id = id.into();
        let key = id.resolve(&self.config.partition_key, self.config.sort_key.as_deref())?;
        let condition = absent(&key);

        let mut retries = self.config.retry_count;
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let fencing_token = new_fencing_token();
            let record = LockRecord::new(&self.owner_name, fencing_token.clone(), None, false);

            match self
                .store
                .put(&self.config.table, &key, record.to_attributes(), Some(&condition))
                .await
            {
                Ok(()) => {
                    info!(lock = %id, attempts, "Fail-closed lock acquired");
                    return Ok(FailClosedLock {
                        store: self.store.clone(),
                        table: self.config.table.clone(),
                        id,
                        key,
                        fencing_token,
                        released: tokio::sync::Mutex::new(false),
                    });
                }
                Err(StoreError::ConditionFailed) if retries > 0 => {
                    retries -= 1;
                    debug!(lock = %id, attempts, retries, "Lock held; retrying");
                    tokio::time::sleep(self.config.acquire_period).await;
                }
                Err(StoreError::ConditionFailed) => {
                    return Err(LockError::AcquisitionExhausted {
                        id: id.to_string(),
                        attempts,
                        source: StoreError::ConditionFailed,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl std::fmt::Debug for FailClosedLockClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailClosedLockClient")
            .field("config", &self.config)
            .field("owner_name", &self.owner_name)
            .finish_non_exhaustive()
    }
}

/// A held fail-closed lock
pub struct FailClosedLock {
    store: Arc<dyn LockStore>,
    table: String,
    id: LockId,
    key: ItemKey,
    fencing_token: String,
    released: tokio::sync::Mutex<bool>,
}

impl FailClosedLock {
    pub fn id(&self) -> &LockId {
        &self.id
    }

    pub fn fencing_token(&self) -> &str {
        &self.fencing_token
    }

    /// Delete the record if it still carries this lock's token
    ///
    /// Returns `Ok(())` without touching the store once a release succeeded.
    pub async fn release(&self) -> Result<()> {
        let mut released = self.released.lock().await;
        if *released {
            return Ok(());
        }

        let condition = held_with(&self.key, &self.fencing_token);
        self.store
            .delete(&self.table, &self.key, Some(&condition))
            .await?;

        *released = true;
        info!(lock = %self.id, "Fail-closed lock released");
        Ok(())
    }
}

impl std::fmt::Debug for FailClosedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailClosedLock")
            .field("table", &self.table)
            .field("id", &self.id)
            .field("fencing_token", &self.fencing_token)
            .finish_non_exhaustive()
    }
}
