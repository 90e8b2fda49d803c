//! Leasehold Common - Shared types and utilities
//!
//! This crate provides the foundational pieces used by every Leasehold crate:
//! - Error types and stable error codes
//! - Lock record attribute names
//! - Time and host identity helpers

pub mod error;
pub mod utils;

// Re-exports for convenience
pub use error::{LockError, Result, StoreError};
pub use utils::{current_rfc3339, current_timestamp_ms, default_owner_name};

/// Lease duration in milliseconds
pub const ATTR_LEASE_DURATION: &str = "leaseDuration";

/// Informational holder identity
pub const ATTR_OWNER_NAME: &str = "ownerName";

/// Token replaced on every successful write by the holder
pub const ATTR_FENCING_TOKEN: &str = "fencingToken";

/// RFC 3339 timestamp of the last write
pub const ATTR_CREATED_AT: &str = "createdAt";

/// Writer's wall clock at acquisition, only written when local time is trusted
pub const ATTR_ACQUIRED_AT_LOCAL_MS: &str = "acquiredAtLocalMs";

/// Attribute names a key attribute may never use
pub const RESERVED_ATTRIBUTES: [&str; 5] = [
    ATTR_LEASE_DURATION,
    ATTR_OWNER_NAME,
    ATTR_FENCING_TOKEN,
    ATTR_CREATED_AT,
    ATTR_ACQUIRED_AT_LOCAL_MS,
];

/// Check whether an attribute name collides with a lock record attribute
pub fn is_reserved_attribute(name: &str) -> bool {
    RESERVED_ATTRIBUTES.contains(&name)
}
