//! Leasehold Store - the conditional-write key-value store boundary
//!
//! This crate provides:
//! - The `LockStore` trait the lock clients are written against
//! - Attribute values, items, and item keys
//! - The precondition grammar (`Condition`) for conditional writes
//! - An in-memory backend
//! - A DynamoDB backend (`dynamodb` feature)

pub mod condition;
pub mod memory;
pub mod value;

#[cfg(feature = "dynamodb")]
pub mod dynamodb;

use async_trait::async_trait;

use leasehold_common::StoreError;

pub use condition::{Condition, RenderedCondition};
pub use memory::MemoryLockStore;
pub use value::{AttributeValue, Item, ItemKey, KeyAttribute};

#[cfg(feature = "dynamodb")]
pub use dynamodb::{DynamoDbConfig, DynamoDbLockStore};

/// Key-value store with strongly consistent reads and conditional writes
///
/// Implementations report a failed precondition as
/// `StoreError::ConditionFailed` and every other failure as another
/// `StoreError` variant. Transport-level retries belong to the implementation.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Strongly consistent point read
    async fn get(&self, table: &str, key: &ItemKey) -> Result<Option<Item>, StoreError>;

    /// Write `attributes` plus the key attributes, replacing any existing item
    async fn put(
        &self,
        table: &str,
        key: &ItemKey,
        attributes: Item,
        condition: Option<&Condition>,
    ) -> Result<(), StoreError>;

    /// Remove the item; succeeds when absent unless the condition says otherwise
    async fn delete(
        &self,
        table: &str,
        key: &ItemKey,
        condition: Option<&Condition>,
    ) -> Result<(), StoreError>;
}
