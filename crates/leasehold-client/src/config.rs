//! Lock client configuration
//!
//! `LockClientConfig` is built in code with `with_*` methods;
//! `LockClientSettings` is the serde shape loaded from a file and the
//! `LEASEHOLD__*` environment variables.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use config::{Config, Environment};
use serde::Deserialize;

use leasehold_common::{LockError, Result, default_owner_name, is_reserved_attribute};

/// Environment variable prefix for settings
pub const ENV_PREFIX: &str = "LEASEHOLD";

const DEFAULT_RETRY_COUNT: u32 = 1;

/// Unit of a configured lease duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeaseUnit {
    #[default]
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl LeaseUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            LeaseUnit::Milliseconds => "milliseconds",
            LeaseUnit::Seconds => "seconds",
            LeaseUnit::Minutes => "minutes",
            LeaseUnit::Hours => "hours",
            LeaseUnit::Days => "days",
        }
    }

    /// Duration of `amount` units
    pub fn to_duration(self, amount: u64) -> Duration {
        match self {
            LeaseUnit::Milliseconds => Duration::from_millis(amount),
            LeaseUnit::Seconds => Duration::from_secs(amount),
            LeaseUnit::Minutes => Duration::from_secs(amount.saturating_mul(60)),
            LeaseUnit::Hours => Duration::from_secs(amount.saturating_mul(3_600)),
            LeaseUnit::Days => Duration::from_secs(amount.saturating_mul(86_400)),
        }
    }
}

impl std::fmt::Display for LeaseUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LeaseUnit {
    type Err = LockError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "milliseconds" | "ms" => Ok(LeaseUnit::Milliseconds),
            "seconds" | "s" => Ok(LeaseUnit::Seconds),
            "minutes" | "m" => Ok(LeaseUnit::Minutes),
            "hours" | "h" => Ok(LeaseUnit::Hours),
            "days" | "d" => Ok(LeaseUnit::Days),
            _ => Err(LockError::configuration(format!("invalid lease unit: {}", s))),
        }
    }
}

/// Reject key attribute names that are empty, duplicated, or reserved
pub(crate) fn validate_key_names(partition_key: &str, sort_key: Option<&str>) -> Result<()> {
    if partition_key.is_empty() {
        return Err(LockError::configuration("partition key name must not be empty"));
    }
    for name in std::iter::once(partition_key).chain(sort_key) {
        if is_reserved_attribute(name) {
            return Err(LockError::configuration(format!(
                "key attribute '{}' collides with a reserved lock record attribute",
                name
            )));
        }
    }
    match sort_key {
        Some("") => Err(LockError::configuration("sort key name must not be empty")),
        Some(sort) if sort == partition_key => Err(LockError::configuration(
            "partition and sort key names must differ",
        )),
        _ => Ok(()),
    }
}

pub(crate) fn validate_table(table: &str) -> Result<()> {
    if table.is_empty() {
        return Err(LockError::configuration("table name must not be empty"));
    }
    Ok(())
}

/// Owner name used when none is configured
pub fn synthesized_owner_name() -> String {
    default_owner_name(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// Configuration for a fail-open `LockClient`
#[derive(Debug, Clone)]
pub struct LockClientConfig {
    /// Informational holder identity; synthesized when `None`
    pub owner_name: Option<String>,
    pub table: String,
    pub partition_key: String,
    pub sort_key: Option<String>,
    pub lease_duration: u64,
    pub lease_unit: LeaseUnit,
    /// Renewal period; `None` disables automatic renewal
    pub heartbeat_period: Option<Duration>,
    /// Wait only the remaining lease as judged by the local clock
    pub trust_local_time: bool,
    /// Extra attempts after the first failed conditional write
    pub retry_count: u32,
}

impl LockClientConfig {
    pub fn new(
        table: impl Into<String>,
        partition_key: impl Into<String>,
        lease_duration: u64,
        lease_unit: LeaseUnit,
    ) -> Self {
        Self {
            owner_name: None,
            table: table.into(),
            partition_key: partition_key.into(),
            sort_key: None,
            lease_duration,
            lease_unit,
            heartbeat_period: None,
            trust_local_time: false,
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

    pub fn with_heartbeat_period(mut self, period: Duration) -> Self {
        self.heartbeat_period = Some(period);
        self
    }

    pub fn with_trust_local_time(mut self, trust_local_time: bool) -> Self {
        self.trust_local_time = trust_local_time;
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Lease duration resolved against its unit
    pub fn lease(&self) -> Duration {
        self.lease_unit.to_duration(self.lease_duration)
    }

    /// Configured owner name, or the synthesized default
    pub fn resolved_owner_name(&self) -> String {
        self.owner_name
            .clone()
            .unwrap_or_else(synthesized_owner_name)
    }

    pub fn validate(&self) -> Result<()> {
        validate_table(&self.table)?;
        validate_key_names(&self.partition_key, self.sort_key.as_deref())?;
        let lease = self.lease();
        if lease.is_zero() {
            return Err(LockError::configuration("lease duration must be positive"));
        }
        if i64::try_from(lease.as_millis()).is_err() {
            return Err(LockError::configuration(format!(
                "lease duration of {} {} is too large",
                self.lease_duration, self.lease_unit
            )));
        }
        if self.heartbeat_period.is_some_and(|p| p.is_zero()) {
            return Err(LockError::configuration("heartbeat period must be positive"));
        }
        Ok(())
    }
}

fn default_lease_unit() -> String {
    LeaseUnit::Milliseconds.as_str().to_string()
}

fn default_retry_count() -> u32 {
    DEFAULT_RETRY_COUNT
}

/// Serializable lock client settings
#[derive(Debug, Clone, Deserialize)]
pub struct LockClientSettings {
    #[serde(default)]
    pub owner_name: Option<String>,
    pub table: String,
    pub partition_key: String,
    #[serde(default)]
    pub sort_key: Option<String>,
    pub lease_duration: u64,
    #[serde(default = "default_lease_unit")]
    pub lease_unit: String,
    #[serde(default)]
    pub heartbeat_period_ms: Option<u64>,
    #[serde(default)]
    pub trust_local_time: bool,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
}

impl LockClientSettings {
    /// Load from an optional file, overridden by `LEASEHOLD__*` variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| LockError::configuration(e.to_string()))
    }
}

impl TryFrom<LockClientSettings> for LockClientConfig {
    type Error = LockError;

    fn try_from(settings: LockClientSettings) -> Result<Self> {
        let config = LockClientConfig {
            owner_name: settings.owner_name,
            table: settings.table,
            partition_key: settings.partition_key,
            sort_key: settings.sort_key,
            lease_duration: settings.lease_duration,
            lease_unit: settings.lease_unit.parse()?,
            heartbeat_period: settings.heartbeat_period_ms.map(Duration::from_millis),
            trust_local_time: settings.trust_local_time,
            retry_count: settings.retry_count,
        };
        config.validate()?;
        Ok(config)
    }
}
