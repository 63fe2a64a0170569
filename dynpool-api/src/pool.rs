//! Pool controller contract.

use crate::entity::PoolStats;
use crate::errors::PoolError;

/// Resize and stats capability of a live worker pool.
///
/// The control plane never creates pools. The hosting process builds them,
/// starts them, and hands them over as `Arc<dyn PoolController>`.
///
/// # Invariant
/// `core_pool_size() <= maximum_pool_size()` holds at every instant. Each
/// setter rejects a value that would break it with [`PoolError::InvalidSize`],
/// so callers changing both sizes must pick the order that keeps every
/// intermediate state valid.
pub trait PoolController: Send + Sync {
    fn core_pool_size(&self) -> usize;

    fn maximum_pool_size(&self) -> usize;

    /// Set the number of workers kept alive while idle.
    fn set_core_pool_size(&self, size: usize) -> Result<(), PoolError>;

    /// Set the upper bound on the number of workers; `0` is rejected.
    fn set_maximum_pool_size(&self, size: usize) -> Result<(), PoolError>;

    /// Consistent snapshot of sizing and activity.
    fn stats(&self) -> PoolStats;
}
