//! Registry implementations.
//!
//! - [`RedisRegistry`]: the production backend shared by a fleet of instances
//! - [`MemoryRegistry`]: process-local backend with the same semantics
//! - [`RetryPolicy`]: the bounded retry both of them rely on

mod memory;
mod redis;
mod retry;

pub use self::memory::MemoryRegistry;
pub use self::redis::RedisRegistry;
pub use self::retry::RetryPolicy;
