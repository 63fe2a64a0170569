//! # dynpool API
//!
//! Contracts shared by everything that takes part in live worker pool
//! resizing: the process that owns the pools, the registry that persists and
//! distributes their configuration, and the operator tooling that issues
//! resize intents.
//!
//! ## Core Components
//!
//! - **Config entity**: the serializable description of one pool's sizing and
//!   observed statistics
//! - **Registry**: key-value store plus publish/subscribe channel used to
//!   persist and distribute configuration
//! - **Pool controller**: the resize/stats capability of a live worker pool
//!
//! ## Usage Example
//!
//! ```rust
//! use dynpool_api::{keys, ThreadPoolConfigEntity};
//!
//! let intent = ThreadPoolConfigEntity::new("svcA", "orderPool").with_sizes(20, 30);
//! assert!(intent.is_consistent());
//! assert_eq!(
//!     keys::config_parameter_key("svcA", "orderPool"),
//!     "THREAD_POOL_CONFIG_PARAMETER_LIST_KEY_svcA_orderPool"
//! );
//! ```
//!
//! ## Module Organization
//!
//! - [`entity`]: config entity and pool statistics
//! - [`keys`]: registry key and channel naming
//! - [`registry`]: the registry contract and subscription handle
//! - [`pool`]: the pool controller contract
//! - [`errors`]: error types

pub mod entity;
pub mod errors;
pub mod keys;
pub mod pool;
pub mod registry;

pub use entity::{PoolStats, ThreadPoolConfigEntity};
pub use errors::{DynamicPoolError, PoolError, RegistryError};
pub use pool::PoolController;
pub use registry::{handler_fn, ChangeHandler, Registry, Subscription};
