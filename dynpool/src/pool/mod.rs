//! Resizable worker pool.
//!
//! [`WorkerPool`] is a bounded pool of named OS threads fed by a bounded job
//! queue. It implements [`PoolController`](dynpool_api::PoolController) so the
//! control plane can resize it while it runs.

mod worker;
mod worker_pool;

pub use worker_pool::{Job, WorkerPool};
