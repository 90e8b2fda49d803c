//! Lock identifiers

use std::fmt::{Display, Formatter};

use leasehold_common::{LockError, Result};
use leasehold_store::{AttributeValue, ItemKey};

/// Identifies the locked resource
///
/// A `Scalar` id is the partition key value of a table without a sort key.
/// A `Structured` id names both components and is required when the client
/// is configured with a sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockId {
    Scalar(AttributeValue),
    Structured {
        partition: AttributeValue,
        sort: Option<AttributeValue>,
    },
}

impl LockId {
    pub fn structured(
        partition: impl Into<AttributeValue>,
        sort: impl Into<AttributeValue>,
    ) -> Self {
        LockId::Structured {
            partition: partition.into(),
            sort: Some(sort.into()),
        }
    }

    /// Resolve against the configured key attribute names
    pub fn resolve(&self, partition_key: &str, sort_key: Option<&str>) -> Result<ItemKey> {
        let (partition, sort) = match self {
            LockId::Scalar(value) => (value, None),
            LockId::Structured { partition, sort } => (partition, sort.as_ref()),
        };
        check_component(partition_key, partition)?;

        match (sort_key, sort) {
            (None, None) => Ok(ItemKey::new(partition_key, partition.clone())),
            (Some(name), Some(value)) => {
                check_component(name, value)?;
                Ok(ItemKey::new(partition_key, partition.clone()).with_sort(name, value.clone()))
            }
            (Some(name), None) => Err(LockError::validation(format!(
                "lock id must include a value for sort key '{}'",
                name
            ))),
            (None, Some(_)) => Err(LockError::validation(
                "lock id has a sort component but no sort key is configured",
            )),
        }
    }
}

fn check_component(name: &str, value: &AttributeValue) -> Result<()> {
    if value.as_s().is_some_and(str::is_empty) {
        return Err(LockError::validation(format!(
            "value for key '{}' must not be empty",
            name
        )));
    }
    Ok(())
}

impl Display for LockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LockId::Scalar(value) => write!(f, "{}", value),
            LockId::Structured {
                partition,
                sort: Some(sort),
            } => write!(f, "{}/{}", partition, sort),
            LockId::Structured { partition, .. } => write!(f, "{}", partition),
        }
    }
}

impl From<AttributeValue> for LockId {
    fn from(value: AttributeValue) -> Self {
        LockId::Scalar(value)
    }
}

impl From<&str> for LockId {
    fn from(value: &str) -> Self {
        LockId::Scalar(value.into())
    }
}

impl From<String> for LockId {
    fn from(value: String) -> Self {
        LockId::Scalar(value.into())
    }
}

impl From<i64> for LockId {
    fn from(value: i64) -> Self {
        LockId::Scalar(value.into())
    }
}
