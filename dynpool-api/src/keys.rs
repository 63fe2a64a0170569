//! Registry key and channel naming.
//!
//! Other tooling (operator consoles, dashboards) reads the same keys, so the
//! literal prefixes below are part of the external contract.

use std::time::Duration;

/// List of every reported pool.
pub const THREAD_POOL_CONFIG_LIST_KEY: &str = "THREAD_POOL_CONFIG_LIST_KEY";

/// Prefix of the per-pool parameter entry.
pub const THREAD_POOL_CONFIG_PARAMETER_LIST_KEY: &str = "THREAD_POOL_CONFIG_PARAMETER_LIST_KEY";

/// Prefix of the per-application change channel.
pub const DYNAMIC_THREAD_POOL_REDIS_TOPIC: &str = "DYNAMIC_THREAD_POOL_REDIS_TOPIC";

/// Parameter entries expire this long after their last write.
pub const CONFIG_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Key of the reported pool list.
///
/// The list is shared by all applications; each entry carries its `appName`.
pub fn pool_list_key() -> &'static str {
    THREAD_POOL_CONFIG_LIST_KEY
}

/// Key of the last known or desired config of one pool.
pub fn config_parameter_key(app_name: &str, pool_name: &str) -> String {
    format!("{THREAD_POOL_CONFIG_PARAMETER_LIST_KEY}_{app_name}_{pool_name}")
}

/// Change channel of one application.
pub fn change_channel(app_name: &str) -> String {
    format!("{DYNAMIC_THREAD_POOL_REDIS_TOPIC}_{app_name}")
}
