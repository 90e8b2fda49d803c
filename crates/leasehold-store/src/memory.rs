//! In-memory lock store
//!
//! Items live in a `DashMap`; each conditional write evaluates its
//! precondition while holding the shard lock for that key, so writes to the
//! same key are atomic with respect to each other.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use leasehold_common::StoreError;

use crate::LockStore;
use crate::condition::Condition;
use crate::value::{Item, ItemKey};

/// In-memory `LockStore` implementation using DashMap
#[derive(Debug, Default)]
pub struct MemoryLockStore {
    items: DashMap<(String, ItemKey), Item>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items across all tables
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn check(condition: Option<&Condition>, current: Option<&Item>) -> Result<(), StoreError> {
        match condition {
            Some(c) if !c.evaluate(current) => Err(StoreError::ConditionFailed),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn get(&self, table: &str, key: &ItemKey) -> Result<Option<Item>, StoreError> {
        Ok(self
            .items
            .get(&(table.to_string(), key.clone()))
            .map(|entry| entry.value().clone()))
    }

    async fn put(
        &self,
        table: &str,
        key: &ItemKey,
        attributes: Item,
        condition: Option<&Condition>,
    ) -> Result<(), StoreError> {
        let mut item = attributes;
        item.extend(key.to_item());

        match self.items.entry((table.to_string(), key.clone())) {
            Entry::Occupied(mut entry) => {
                Self::check(condition, Some(entry.get()))?;
                entry.insert(item);
            }
            Entry::Vacant(entry) => {
                Self::check(condition, None)?;
                entry.insert(item);
            }
        }

        debug!(table = %table, key = %key, "Item written");
        Ok(())
    }

    async fn delete(
        &self,
        table: &str,
        key: &ItemKey,
        condition: Option<&Condition>,
    ) -> Result<(), StoreError> {
        match self.items.entry((table.to_string(), key.clone())) {
            Entry::Occupied(entry) => {
                Self::check(condition, Some(entry.get()))?;
                entry.remove();
                debug!(table = %table, key = %key, "Item deleted");
            }
            Entry::Vacant(_) => {
                Self::check(condition, None)?;
            }
        }
        Ok(())
    }
}
