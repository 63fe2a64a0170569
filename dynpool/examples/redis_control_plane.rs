//! Live resize through Redis
//!
//! Starts two worker pools under the control plane, then acts as the operator
//! and resizes one of them through the registry.
//!
//! ```bash
//! # needs a Redis server on 127.0.0.1:6379
//! cargo run -p dynpool --example redis_control_plane
//! ```

use std::sync::Arc;
use std::time::Duration;

use dynpool::config::WorkerPoolConfig;
use dynpool::{
    logging, DynamicPoolConfig, DynamicPoolSystem, PoolController, RedisRegistry,
    RedisRegistryConfig, ThreadPoolConfigEntity, WorkerPool,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_development();

    let registry = Arc::new(RedisRegistry::connect(RedisRegistryConfig::default()).await?);

    let order_pool = Arc::new(WorkerPool::new(WorkerPoolConfig::new("orderPool", 2, 4))?);
    let payment_pool = Arc::new(WorkerPool::new(WorkerPoolConfig::new("paymentPool", 1, 2))?);
    let pools: Vec<(&str, Arc<dyn PoolController>)> = vec![
        ("orderPool", order_pool.clone() as Arc<dyn PoolController>),
        ("paymentPool", payment_pool.clone() as Arc<dyn PoolController>),
    ];

    let config = DynamicPoolConfig {
        report_interval: Duration::from_secs(5),
        ..DynamicPoolConfig::default().with_app_name("svcA")
    };
    let system = DynamicPoolSystem::start(config, registry, pools).await?;

    for order in 0..20 {
        order_pool.execute(move || {
            std::thread::sleep(Duration::from_millis(50));
            tracing::debug!(order, "order processed");
        })?;
    }

    system
        .admin()
        .adjust(&ThreadPoolConfigEntity::new(system.app_name(), "orderPool").with_sizes(8, 16))
        .await?;

    tokio::time::sleep(Duration::from_secs(1)).await;
    let current = system.manager().query_by_name("orderPool")?;
    println!(
        "orderPool now core={} max={} live={} completed={}",
        current.core_pool_size,
        current.maximum_pool_size,
        current.pool_size,
        current.completed_task_count
    );

    system.shutdown().await;
    order_pool.shutdown();
    payment_pool.shutdown();
    order_pool.await_termination(Duration::from_secs(5));
    Ok(())
}
