// dynpool
//
// Live-resizable worker pools driven by a shared configuration registry.
// This crate implements the contracts of `dynpool-api`: a resizable worker
// pool, the manager that applies configuration to a process's pools, the
// change listener and stats reporter that talk to the registry, and Redis
// and in-memory registries.

pub mod admin;
pub mod config;
pub mod listener;
pub mod logging;
pub mod manager;
pub mod pool;
pub mod registry;
pub mod reporter;
pub mod system;

pub use admin::ConfigAdmin;
pub use config::{resolve_app_name, DynamicPoolConfig, RedisRegistryConfig, WorkerPoolConfig};
pub use listener::ChangeListener;
pub use manager::WorkerPoolManager;
pub use pool::{Job, WorkerPool};
pub use registry::{MemoryRegistry, RedisRegistry, RetryPolicy};
pub use reporter::StatsReporter;
pub use system::DynamicPoolSystem;

// Re-export the contracts so hosts depend on one crate
pub use dynpool_api::{
    handler_fn, keys, ChangeHandler, DynamicPoolError, PoolController, PoolError, PoolStats,
    Registry, RegistryError, Subscription, ThreadPoolConfigEntity,
};
