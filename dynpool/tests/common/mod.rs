// Shared helpers for dynpool integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use dynpool::config::WorkerPoolConfig;
use dynpool::pool::WorkerPool;
use dynpool::{PoolController, WorkerPoolManager};

pub const APP: &str = "svcA";

pub fn worker_pool(name: &str, core: usize, max: usize) -> Arc<WorkerPool> {
    Arc::new(WorkerPool::new(WorkerPoolConfig::new(name, core, max)).unwrap())
}

pub fn controller(name: &str, core: usize, max: usize) -> (String, Arc<dyn PoolController>) {
    let pool: Arc<dyn PoolController> = worker_pool(name, core, max);
    (name.to_string(), pool)
}

pub fn manager(pools: &[(&str, usize, usize)]) -> Arc<WorkerPoolManager> {
    Arc::new(WorkerPoolManager::new(
        APP,
        pools.iter().map(|&(name, core, max)| controller(name, core, max)),
    ))
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Blocking variant of [`eventually`] for tests driving pool threads.
pub fn eventually_blocking(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

pub fn init_logging() {
    dynpool::logging::init_test();
}
