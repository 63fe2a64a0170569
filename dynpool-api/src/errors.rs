//! # Error Types
//!
//! Errors are split by concern:
//!
//! - [`RegistryError`]: the backing store or channel failed, or a payload on
//!   it could not be decoded
//! - [`PoolError`]: a live pool refused an operation
//! - [`DynamicPoolError`]: what the manager, the operator tooling and the
//!   composition root return; wraps the other two
//!
//! Background loops (change delivery, periodic reporting) log these and keep
//! running. Only explicit, caller-driven operations return them.

use thiserror::Error;

/// Errors raised by a [`Registry`](crate::registry::Registry).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Store or channel unreachable after the registry's own retries.
    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    /// A payload could not be encoded or decoded.
    #[error("Malformed registry payload: {0}")]
    Serialization(String),
}

impl RegistryError {
    /// Whether retrying the operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RegistryError::Unavailable(_))
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Serialization(err.to_string())
    }
}

/// Errors raised by a live pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The requested size would leave `core > max` or `max == 0`.
    #[error("Invalid pool size: core {core}, maximum {max}")]
    InvalidSize { core: usize, max: usize },

    /// Queue full and no worker can be added.
    #[error("Pool {pool} saturated, job rejected")]
    Rejected { pool: String },

    #[error("Pool is shut down")]
    ShutDown,

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(String),
}

/// Errors returned by pool management operations.
#[derive(Error, Debug)]
pub enum DynamicPoolError {
    /// The pool name is not owned by this process.
    #[error("Pool not found: {0}")]
    NotFound(String),

    /// An incoming config had `core > max`; nothing was applied.
    #[error("Invalid config for pool {pool}: core {core} exceeds maximum {max}")]
    Validation { pool: String, core: usize, max: usize },

    /// Invalid local configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Internal error: {0}")]
    Other(#[from] anyhow::Error),
}
