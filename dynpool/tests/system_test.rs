mod common;

use std::sync::Arc;
use std::time::Duration;

use dynpool::keys::CONFIG_TTL;
use dynpool::{
    ConfigAdmin, DynamicPoolConfig, DynamicPoolError, DynamicPoolSystem, MemoryRegistry, Registry,
    ThreadPoolConfigEntity,
};

use common::{controller, eventually, APP};

const WAIT: Duration = Duration::from_secs(5);

fn config() -> DynamicPoolConfig {
    DynamicPoolConfig {
        report_interval: Duration::from_millis(20),
        ..DynamicPoolConfig::default().with_app_name(APP)
    }
}

#[tokio::test]
async fn test_start_restores_reports_and_applies_changes() {
    common::init_logging();
    let registry = Arc::new(MemoryRegistry::new());
    registry
        .put_config(
            &ThreadPoolConfigEntity::new(APP, "orderPool").with_sizes(8, 16),
            CONFIG_TTL,
        )
        .await
        .unwrap();

    let system = DynamicPoolSystem::start(
        config(),
        registry.clone(),
        [controller("orderPool", 5, 10), controller("paymentPool", 1, 2)],
    )
    .await
    .unwrap();

    assert_eq!(system.app_name(), APP);
    let order = system.manager().query_by_name("orderPool").unwrap();
    assert_eq!((order.core_pool_size, order.maximum_pool_size), (8, 16));

    // periodic reports
    assert!(eventually(WAIT, || registry.list(APP).len() >= 4).await);

    // operator resize reaches the pool through the subscription
    system
        .admin()
        .adjust(&ThreadPoolConfigEntity::new(APP, "paymentPool").with_sizes(20, 30))
        .await
        .unwrap();
    let manager = system.manager().clone();
    assert!(
        eventually(WAIT, || {
            manager
                .query_by_name("paymentPool")
                .map(|e| (e.core_pool_size, e.maximum_pool_size) == (20, 30))
                .unwrap_or(false)
        })
        .await
    );

    system.shutdown().await;
    assert!(eventually(WAIT, || registry.subscriber_count(APP) == 0).await);
}

#[tokio::test]
async fn test_start_without_app_name_uses_fallback() {
    let registry = Arc::new(MemoryRegistry::new());

    let system = DynamicPoolSystem::start(
        DynamicPoolConfig::default(),
        registry.clone(),
        [controller("orderPool", 1, 2)],
    )
    .await
    .unwrap();

    assert_eq!(system.app_name(), "default");
    assert_eq!(
        system.subscription().channel(),
        "DYNAMIC_THREAD_POOL_REDIS_TOPIC_default"
    );
    system.shutdown().await;
}

#[tokio::test]
async fn test_bootstrap_failure_is_fatal_only_when_configured() {
    let registry = Arc::new(MemoryRegistry::new());
    registry.set_available(false);
    let fail_fast = DynamicPoolConfig {
        fail_fast_bootstrap: true,
        ..config()
    };

    let result =
        DynamicPoolSystem::start(fail_fast, registry.clone(), [controller("orderPool", 1, 2)]).await;
    assert!(matches!(result, Err(DynamicPoolError::Registry(_))));

    // Subscribing needs the registry, so a tolerant start still fails while it is down.
    let tolerant =
        DynamicPoolSystem::start(config(), registry.clone(), [controller("orderPool", 1, 2)]).await;
    assert!(matches!(tolerant, Err(DynamicPoolError::Registry(_))));

    registry.set_available(true);
    let system = DynamicPoolSystem::start(config(), registry, [controller("orderPool", 1, 2)])
        .await
        .unwrap();
    system.shutdown().await;
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let config = DynamicPoolConfig {
        config_ttl: Duration::ZERO,
        ..config()
    };

    let result = DynamicPoolSystem::start(
        config,
        Arc::new(MemoryRegistry::new()),
        [controller("orderPool", 1, 2)],
    )
    .await;

    assert!(matches!(result, Err(DynamicPoolError::Config(_))));
}

#[tokio::test]
async fn test_admin_validates_before_writing() {
    let registry = Arc::new(MemoryRegistry::new());
    let admin = ConfigAdmin::new(registry.clone());

    let err = admin
        .adjust(&ThreadPoolConfigEntity::new(APP, "orderPool").with_sizes(50, 10))
        .await
        .unwrap_err();

    assert!(matches!(err, DynamicPoolError::Validation { core: 50, max: 10, .. }));
    assert_eq!(admin.current(APP, "orderPool").await.unwrap(), None);
}

#[tokio::test]
async fn test_admin_stores_and_publishes() {
    let registry = Arc::new(MemoryRegistry::new());
    let admin = ConfigAdmin::new(registry.clone());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _subscription = registry
        .subscribe(
            APP,
            dynpool::handler_fn(move |entity| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(entity);
                }
            }),
        )
        .await
        .unwrap();
    let intent = ThreadPoolConfigEntity::new(APP, "orderPool").with_sizes(20, 30);

    admin.adjust(&intent).await.unwrap();

    assert_eq!(admin.current(APP, "orderPool").await.unwrap(), Some(intent.clone()));
    let delivered = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(delivered, intent);
}

#[tokio::test]
async fn test_admin_surfaces_registry_errors() {
    let registry = Arc::new(MemoryRegistry::new());
    registry.set_available(false);

    let result = ConfigAdmin::new(registry)
        .adjust(&ThreadPoolConfigEntity::new(APP, "orderPool").with_sizes(1, 2))
        .await;

    assert!(matches!(result, Err(DynamicPoolError::Registry(_))));
}
