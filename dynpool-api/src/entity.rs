//! Config entity and pool statistics.
//!
//! [`ThreadPoolConfigEntity`] is the unit of exchange between a process and
//! the registry. Its sizing fields (`core_pool_size`, `maximum_pool_size`) are
//! the only inputs to mutation; the remaining fields are a snapshot taken at
//! report time and are ignored when an entity is applied.

use serde::{Deserialize, Serialize};

/// Point-in-time statistics of a live pool.
///
/// `core_pool_size` and `maximum_pool_size` are always read together, so a
/// snapshot never pairs a core size with a maximum it did not coexist with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Configured number of workers kept alive while idle
    pub core_pool_size: usize,

    /// Upper bound on the number of workers
    pub maximum_pool_size: usize,

    /// Workers currently alive
    pub pool_size: usize,

    /// Workers currently running a job
    pub active_count: usize,

    /// Jobs waiting in the queue
    pub queue_size: usize,

    /// Jobs finished since the pool started
    pub completed_task_count: u64,

    /// Bound of the job queue
    pub queue_capacity: usize,
}

impl PoolStats {
    /// Free slots left in the queue.
    pub fn remaining_capacity(&self) -> usize {
        self.queue_capacity.saturating_sub(self.queue_size)
    }
}

/// Desired or observed sizing of one pool of one application.
///
/// Serialized in camelCase so payloads written by other tooling on the same
/// registry decode unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadPoolConfigEntity {
    /// Logical identity of the group of processes sharing configuration
    pub app_name: String,

    /// Pool name, unique within `app_name`
    pub thread_pool_name: String,

    pub core_pool_size: usize,

    pub maximum_pool_size: usize,

    #[serde(default)]
    pub active_count: usize,

    #[serde(default)]
    pub pool_size: usize,

    #[serde(default)]
    pub queue_size: usize,

    #[serde(default)]
    pub completed_task_count: u64,

    #[serde(default)]
    pub queue_capacity: usize,

    #[serde(default)]
    pub remaining_capacity: usize,
}

impl ThreadPoolConfigEntity {
    /// Create an entity with zero sizes and an empty snapshot.
    pub fn new(app_name: impl Into<String>, thread_pool_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            thread_pool_name: thread_pool_name.into(),
            ..Default::default()
        }
    }

    /// Set the desired core and maximum pool sizes.
    pub fn with_sizes(mut self, core_pool_size: usize, maximum_pool_size: usize) -> Self {
        self.core_pool_size = core_pool_size;
        self.maximum_pool_size = maximum_pool_size;
        self
    }

    /// Build the report entity for a pool from its live statistics.
    pub fn from_stats(
        app_name: impl Into<String>,
        thread_pool_name: impl Into<String>,
        stats: &PoolStats,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            thread_pool_name: thread_pool_name.into(),
            core_pool_size: stats.core_pool_size,
            maximum_pool_size: stats.maximum_pool_size,
            active_count: stats.active_count,
            pool_size: stats.pool_size,
            queue_size: stats.queue_size,
            completed_task_count: stats.completed_task_count,
            queue_capacity: stats.queue_capacity,
            remaining_capacity: stats.remaining_capacity(),
        }
    }

    /// `core_pool_size <= maximum_pool_size`
    pub fn is_consistent(&self) -> bool {
        self.core_pool_size <= self.maximum_pool_size
    }

    /// Encode as the JSON wire payload.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a JSON wire payload.
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_capacity_saturates() {
        let stats = PoolStats {
            queue_capacity: 4,
            queue_size: 6,
            ..Default::default()
        };
        assert_eq!(stats.remaining_capacity(), 0);
    }

    #[test]
    fn test_consistency() {
        let entity = ThreadPoolConfigEntity::new("app", "pool");
        assert!(entity.clone().with_sizes(3, 3).is_consistent());
        assert!(!entity.with_sizes(4, 3).is_consistent());
    }
}
