use std::time::Duration;

use dynpool::config::{
    resolve_app_name, DynamicPoolConfig, RedisRegistryConfig, WorkerPoolConfig, DEFAULT_APP_NAME,
    DEFAULT_MAX_LIST_LEN, DEFAULT_QUEUE_CAPACITY,
};
use dynpool::{DynamicPoolError, RetryPolicy};

#[test]
fn test_app_name_fallback() {
    assert_eq!(resolve_app_name(Some("svcA")), "svcA");
    assert_eq!(resolve_app_name(Some("  svcA ")), "svcA");
    assert_eq!(resolve_app_name(Some("   ")), DEFAULT_APP_NAME);
    assert_eq!(resolve_app_name(Some("")), DEFAULT_APP_NAME);
    assert_eq!(resolve_app_name(None), "default");
}

#[test]
fn test_dynamic_pool_config_defaults() {
    let config = DynamicPoolConfig::default();

    assert_eq!(config.app_name, None);
    assert_eq!(config.report_interval, Duration::from_secs(20));
    assert_eq!(config.config_ttl, Duration::from_secs(30 * 24 * 60 * 60));
    assert!(!config.fail_fast_bootstrap);
    assert!(config.validate().is_ok());
    assert_eq!(config.with_app_name("svcA").app_name.as_deref(), Some("svcA"));
}

#[test]
fn test_dynamic_pool_config_rejects_zero_interval() {
    let config = DynamicPoolConfig {
        report_interval: Duration::ZERO,
        ..Default::default()
    };

    assert!(matches!(config.validate(), Err(DynamicPoolError::Config(_))));
}

#[test]
fn test_redis_url() {
    let mut config = RedisRegistryConfig::default();
    assert_eq!(config.url(), "redis://127.0.0.1:6379/0");

    config.password = Some("s3cret".into());
    config.database = 2;
    config.host = "cache.internal".into();
    assert_eq!(config.url(), "redis://:s3cret@cache.internal:6379/2");

    config.password = Some(String::new());
    assert_eq!(config.url(), "redis://cache.internal:6379/2");
}

#[test]
fn test_redis_config_validation() {
    assert!(RedisRegistryConfig::default().validate().is_ok());

    let config = RedisRegistryConfig {
        pool_size: 0,
        ..Default::default()
    };
    assert!(config.validate().is_err());

    let config = RedisRegistryConfig {
        host: " ".into(),
        ..Default::default()
    };
    assert!(config.validate().is_err());

    let config = RedisRegistryConfig {
        max_list_len: 0,
        ..Default::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_redis_config_accepts_min_idle_size() {
    let config = RedisRegistryConfig {
        min_idle_size: 0,
        ..Default::default()
    };
    assert!(config.validate().is_ok());

    let config = RedisRegistryConfig {
        min_idle_size: 64,
        ..Default::default()
    };
    assert!(config.validate().is_ok());
    assert_eq!(config.max_list_len, DEFAULT_MAX_LIST_LEN);
}

#[test]
fn test_retry_policy_from_redis_config() {
    let config = RedisRegistryConfig {
        retry_attempts: 5,
        retry_interval: Duration::from_millis(250),
        ..Default::default()
    };

    let policy = RetryPolicy::from(&config);

    assert_eq!(policy.attempts, 5);
    assert_eq!(policy.interval, Duration::from_millis(250));
    assert_eq!(RetryPolicy::default(), RetryPolicy::from(&RedisRegistryConfig::default()));
}

#[test]
fn test_worker_pool_config_defaults() {
    let config = WorkerPoolConfig::default();

    assert!(config.core_pool_size >= 1);
    assert_eq!(config.maximum_pool_size, config.core_pool_size * 2);
    assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    assert!(config.validate().is_ok());

    let config = WorkerPoolConfig::new("orderPool", 5, 10).with_queue_capacity(8);
    assert_eq!(
        (config.core_pool_size, config.maximum_pool_size, config.queue_capacity),
        (5, 10, 8)
    );
}
