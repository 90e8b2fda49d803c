//! Leasehold Client - lease-based distributed locks
//!
//! This crate provides:
//! - `LockClient`: fail-open locks that expire unless renewed
//! - `Lease`: a held lock with heartbeat renewal and serialized release
//! - `FailClosedLockClient`: lease-less locks held until explicitly released
//! - Client configuration loaded from files and `LEASEHOLD__*` variables

pub mod client;
pub mod config;
pub mod fail_closed;
pub mod id;
pub mod lease;
pub mod record;

pub use client::LockClient;
pub use crate::config::{LeaseUnit, LockClientConfig, LockClientSettings};
pub use fail_closed::{FailClosedConfig, FailClosedLock, FailClosedLockClient};
pub use id::LockId;
pub use lease::Lease;
pub use record::LockRecord;

// Store and error re-exports
pub use leasehold_common::{LockError, Result, StoreError};
pub use leasehold_store::{AttributeValue, ItemKey, LockStore, MemoryLockStore};
