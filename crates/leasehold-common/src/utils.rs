//! Utility functions for Leasehold

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in Unix milliseconds
pub fn current_timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Current wall-clock time as an RFC 3339 string
pub fn current_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Name of the local host, or "localhost" when it cannot be read
pub fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "localhost".to_string())
}

/// Name of the local user from the environment
pub fn local_username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Diagnostic owner identity: `<package>@<version>_<user>@<host>`
///
/// # Examples
///
/// ```
/// use leasehold_common::default_owner_name;
///
/// let owner = default_owner_name("leasehold", "0.1.0");
/// assert!(owner.starts_with("leasehold@0.1.0_"));
/// ```
pub fn default_owner_name(package: &str, version: &str) -> String {
    format!(
        "{}@{}_{}@{}",
        package,
        version,
        local_username(),
        local_hostname()
    )
}
