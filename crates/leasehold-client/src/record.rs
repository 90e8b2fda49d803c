//! Stored lock record and the preconditions guarding it

use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use leasehold_common::{
    ATTR_ACQUIRED_AT_LOCAL_MS, ATTR_CREATED_AT, ATTR_FENCING_TOKEN, ATTR_LEASE_DURATION,
    ATTR_OWNER_NAME, LockError, Result, current_rfc3339, current_timestamp_ms,
};
use leasehold_store::{AttributeValue, Condition, Item, ItemKey};

/// Fresh, globally unique fencing token
pub fn new_fencing_token() -> String {
    Uuid::new_v4().to_string()
}

/// Lock record attributes, excluding the key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    pub owner_name: Option<String>,
    pub fencing_token: String,
    /// `None` for fail-closed records, which carry no lease
    pub lease_duration_ms: Option<u64>,
    pub created_at: Option<String>,
    pub acquired_at_local_ms: Option<i64>,
}

impl LockRecord {
    /// Record for a write happening now
    pub fn new(
        owner_name: &str,
        fencing_token: String,
        lease: Option<Duration>,
        trust_local_time: bool,
    ) -> Self {
        Self {
            owner_name: Some(owner_name.to_string()),
            fencing_token,
            lease_duration_ms: lease.map(|l| u64::try_from(l.as_millis()).unwrap_or(u64::MAX)),
            created_at: Some(current_rfc3339()),
            acquired_at_local_ms: trust_local_time.then(current_timestamp_ms),
        }
    }

    pub fn from_item(item: &Item) -> Result<Self> {
        let fencing_token = item
            .get(ATTR_FENCING_TOKEN)
            .and_then(AttributeValue::as_s)
            .ok_or_else(|| {
                LockError::MalformedRecord(format!(
                    "missing string attribute '{}'",
                    ATTR_FENCING_TOKEN
                ))
            })?
            .to_string();

        let lease_duration_ms = match item.get(ATTR_LEASE_DURATION) {
            None => None,
            Some(value) => Some(
                value
                    .as_n()
                    .and_then(|n| u64::try_from(n).ok())
                    .ok_or_else(|| {
                        LockError::MalformedRecord(format!(
                            "attribute '{}' must be a non-negative number",
                            ATTR_LEASE_DURATION
                        ))
                    })?,
            ),
        };

        Ok(Self {
            owner_name: item
                .get(ATTR_OWNER_NAME)
                .and_then(AttributeValue::as_s)
                .map(str::to_string),
            fencing_token,
            lease_duration_ms,
            created_at: item
                .get(ATTR_CREATED_AT)
                .and_then(AttributeValue::as_s)
                .map(str::to_string),
            acquired_at_local_ms: item
                .get(ATTR_ACQUIRED_AT_LOCAL_MS)
                .and_then(AttributeValue::as_n),
        })
    }

    pub fn to_attributes(&self) -> Item {
        let mut item = Item::new();
        item.insert(
            ATTR_FENCING_TOKEN.to_string(),
            AttributeValue::S(self.fencing_token.clone()),
        );
        if let Some(owner) = &self.owner_name {
            item.insert(ATTR_OWNER_NAME.to_string(), AttributeValue::S(owner.clone()));
        }
        if let Some(lease) = self.lease_duration_ms {
            // Stored numbers are i64; never let a lease wrap negative
            let lease = i64::try_from(lease).unwrap_or(i64::MAX);
            item.insert(ATTR_LEASE_DURATION.to_string(), AttributeValue::N(lease));
        }
        if let Some(created_at) = &self.created_at {
            item.insert(ATTR_CREATED_AT.to_string(), AttributeValue::S(created_at.clone()));
        }
        if let Some(acquired_at) = self.acquired_at_local_ms {
            item.insert(ATTR_ACQUIRED_AT_LOCAL_MS.to_string(), AttributeValue::N(acquired_at));
        }
        item
    }

    /// Stored lease, required of any record a fail-open client waits on
    pub fn lease(&self) -> Result<Duration> {
        self.lease_duration_ms
            .map(Duration::from_millis)
            .ok_or_else(|| {
                LockError::MalformedRecord(format!(
                    "missing numeric attribute '{}'",
                    ATTR_LEASE_DURATION
                ))
            })
    }

    /// How long a contender waits before trying to overwrite this record
    ///
    /// With local time trusted and an acquisition timestamp present this is
    /// the lease remaining on the local clock, clamped to `[0, lease]`.
    /// Otherwise it is the full stored lease.
    pub fn wait_interval(&self, trust_local_time: bool, now_ms: i64) -> Result<Duration> {
        let lease = self.lease()?;
        let Some(acquired_at) = self.acquired_at_local_ms.filter(|_| trust_local_time) else {
            return Ok(lease);
        };
        let lease_ms = lease.as_millis() as i64;
        let elapsed = now_ms.saturating_sub(acquired_at).max(0);
        let remaining = lease_ms.saturating_sub(elapsed).max(0);
        Ok(Duration::from_millis(remaining as u64))
    }
}

/// Precondition: no item exists under `key`
pub fn absent(key: &ItemKey) -> Condition {
    let partition = Condition::not_exists(key.partition.name.as_str());
    match &key.sort {
        Some(sort) => partition.and(Condition::not_exists(sort.name.as_str())),
        None => partition,
    }
}

/// Precondition: the item exists and still carries `fencing_token`
pub fn held_with(key: &ItemKey, fencing_token: &str) -> Condition {
    Condition::exists(key.partition.name.as_str())
        .and(Condition::equals(ATTR_FENCING_TOKEN, fencing_token))
}

/// Precondition: the item is absent or still carries `fencing_token`
pub fn absent_or_held_with(key: &ItemKey, fencing_token: &str) -> Condition {
    absent(key).or(Condition::equals(ATTR_FENCING_TOKEN, fencing_token))
}
