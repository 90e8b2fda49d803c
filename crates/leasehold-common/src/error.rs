//! Error types and error codes for Leasehold
//!
//! This module defines:
//! - `StoreError`: failures reported by a lock store backend
//! - `LockError`: errors surfaced by the lock clients
//! - Stable error codes callers can branch on

/// Code for invalid client configuration (reserved names, bad units)
pub const CONFIGURATION_ERROR: &str = "ConfigurationError";

/// Code for an unusable lock id
pub const VALIDATION_ERROR: &str = "ValidationError";

/// Code returned once the acquisition retry budget is spent
pub const FAILED_TO_ACQUIRE_LOCK: &str = "FailedToAcquireLock";

/// Code for a stored record missing required attributes
pub const MALFORMED_RECORD: &str = "MalformedRecord";

/// Code for any other backend failure
pub const STORAGE_ERROR: &str = "StorageError";

/// Errors reported by a lock store backend
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The write's precondition did not hold
    #[error("conditional check failed")]
    ConditionFailed,

    #[error("request throttled: {0}")]
    Throttled(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_condition_failed(&self) -> bool {
        matches!(self, StoreError::ConditionFailed)
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// Errors surfaced by the lock clients
#[derive(thiserror::Error, Debug)]
pub enum LockError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid lock id: {0}")]
    Validation(String),

    #[error("failed to acquire lock '{id}' after {attempts} attempt(s)")]
    AcquisitionExhausted {
        id: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("malformed lock record: {0}")]
    MalformedRecord(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl LockError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            LockError::Configuration(_) => CONFIGURATION_ERROR,
            LockError::Validation(_) => VALIDATION_ERROR,
            LockError::AcquisitionExhausted { .. } => FAILED_TO_ACQUIRE_LOCK,
            LockError::MalformedRecord(_) => MALFORMED_RECORD,
            LockError::Storage(_) => STORAGE_ERROR,
        }
    }

    /// True when the underlying cause is a failed store precondition
    pub fn is_condition_failed(&self) -> bool {
        match self {
            LockError::Storage(e) => e.is_condition_failed(),
            LockError::AcquisitionExhausted { source, .. } => source.is_condition_failed(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, LockError>;
