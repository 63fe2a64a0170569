mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use proptest::prelude::*;

use dynpool::{
    DynamicPoolError, MemoryRegistry, PoolController, PoolError, PoolStats, Registry,
    ThreadPoolConfigEntity, WorkerPoolManager,
};

use common::{controller, manager, APP};

fn intent(pool: &str, core: usize, max: usize) -> ThreadPoolConfigEntity {
    ThreadPoolConfigEntity::new(APP, pool).with_sizes(core, max)
}

/// Controller that records the order of setter calls.
struct RecordingController {
    sizes: Mutex<(usize, usize)>,
    calls: Mutex<Vec<&'static str>>,
}

impl RecordingController {
    fn new(core: usize, max: usize) -> Self {
        Self {
            sizes: Mutex::new((core, max)),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

impl PoolController for RecordingController {
    fn core_pool_size(&self) -> usize {
        self.sizes.lock().unwrap().0
    }

    fn maximum_pool_size(&self) -> usize {
        self.sizes.lock().unwrap().1
    }

    fn set_core_pool_size(&self, size: usize) -> Result<(), PoolError> {
        let mut sizes = self.sizes.lock().unwrap();
        self.calls.lock().unwrap().push("core");
        if size > sizes.1 {
            return Err(PoolError::InvalidSize { core: size, max: sizes.1 });
        }
        sizes.0 = size;
        Ok(())
    }

    fn set_maximum_pool_size(&self, size: usize) -> Result<(), PoolError> {
        let mut sizes = self.sizes.lock().unwrap();
        self.calls.lock().unwrap().push("max");
        if size < sizes.0 {
            return Err(PoolError::InvalidSize { core: sizes.0, max: size });
        }
        sizes.1 = size;
        Ok(())
    }

    fn stats(&self) -> PoolStats {
        let (core, max) = *self.sizes.lock().unwrap();
        PoolStats {
            core_pool_size: core,
            maximum_pool_size: max,
            queue_capacity: 16,
            ..Default::default()
        }
    }
}

fn recording_manager(core: usize, max: usize) -> (WorkerPoolManager, Arc<RecordingController>) {
    let recorder = Arc::new(RecordingController::new(core, max));
    let pool: Arc<dyn PoolController> = recorder.clone();
    (WorkerPoolManager::new(APP, [("orderPool", pool)]), recorder)
}

#[test]
fn test_update_then_query_returns_new_sizes() {
    let manager = manager(&[("orderPool", 5, 10)]);

    let applied = manager.update_config(&intent("orderPool", 20, 30)).unwrap();
    let queried = manager.query_by_name("orderPool").unwrap();

    assert_eq!((applied.core_pool_size, applied.maximum_pool_size), (20, 30));
    assert_eq!((queried.core_pool_size, queried.maximum_pool_size), (20, 30));
    assert_eq!(queried.app_name, APP);
}

#[test]
fn test_inconsistent_update_is_rejected_and_pool_unchanged() {
    let manager = manager(&[("orderPool", 5, 10)]);
    manager.update_config(&intent("orderPool", 20, 30)).unwrap();

    let err = manager.update_config(&intent("orderPool", 50, 10)).unwrap_err();

    assert!(matches!(
        err,
        DynamicPoolError::Validation { ref pool, core: 50, max: 10 } if pool == "orderPool"
    ));
    let current = manager.query_by_name("orderPool").unwrap();
    assert_eq!((current.core_pool_size, current.maximum_pool_size), (20, 30));
}

#[test]
fn test_zero_maximum_is_refused_before_touching_pool() {
    let manager = manager(&[("orderPool", 1, 2)]);

    let err = manager.update_config(&intent("orderPool", 0, 0)).unwrap_err();

    assert!(matches!(
        err,
        DynamicPoolError::Pool(PoolError::InvalidSize { core: 0, max: 0 })
    ));
    let current = manager.query_by_name("orderPool").unwrap();
    assert_eq!((current.core_pool_size, current.maximum_pool_size), (1, 2));
}

#[test]
fn test_unknown_pool_is_not_found() {
    let manager = manager(&[("orderPool", 5, 10)]);

    assert!(matches!(
        manager.query_by_name("paymentPool"),
        Err(DynamicPoolError::NotFound(name)) if name == "paymentPool"
    ));
    assert!(matches!(
        manager.update_config(&intent("paymentPool", 1, 2)),
        Err(DynamicPoolError::NotFound(_))
    ));
}

#[test]
fn test_query_all_is_sorted_and_consistent() {
    let manager = manager(&[("zPool", 1, 2), ("aPool", 3, 3), ("mPool", 0, 8)]);

    let all = manager.query_all();

    let names: Vec<_> = all.iter().map(|e| e.thread_pool_name.as_str()).collect();
    assert_eq!(names, ["aPool", "mPool", "zPool"]);
    assert!(all.iter().all(ThreadPoolConfigEntity::is_consistent));
    assert!(all.iter().all(|e| e.app_name == APP));
    assert_eq!(manager.len(), 3);
}

#[test]
fn test_raising_core_past_max_sets_max_first() {
    let (manager, recorder) = recording_manager(2, 4);

    manager.update_config(&intent("orderPool", 10, 20)).unwrap();

    assert_eq!(recorder.calls(), ["max", "core"]);
    assert_eq!(recorder.stats().core_pool_size, 10);
    assert_eq!(recorder.stats().maximum_pool_size, 20);
}

#[test]
fn test_lowering_sets_core_first() {
    let (manager, recorder) = recording_manager(10, 20);

    manager.update_config(&intent("orderPool", 2, 4)).unwrap();

    assert_eq!(recorder.calls(), ["core", "max"]);
    assert_eq!(recorder.stats().core_pool_size, 2);
    assert_eq!(recorder.stats().maximum_pool_size, 4);
}

#[test]
fn test_update_ignores_snapshot_fields() {
    let (manager, recorder) = recording_manager(2, 4);
    let mut entity = intent("orderPool", 3, 6);
    entity.active_count = 99;
    entity.queue_size = 1000;
    entity.queue_capacity = 1;

    let applied = manager.update_config(&entity).unwrap();

    assert_eq!(applied.queue_capacity, 16);
    assert_eq!(applied.active_count, 0);
    assert_eq!(recorder.stats().core_pool_size, 3);
}

#[test]
fn test_resize_past_old_max_is_never_observed_inconsistent() {
    let manager = manager(&[("orderPool", 2, 4)]);
    let done = AtomicBool::new(false);
    let violations = AtomicBool::new(false);

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                while !done.load(Ordering::SeqCst) {
                    let current = manager.query_by_name("orderPool").unwrap();
                    if !current.is_consistent() {
                        violations.store(true, Ordering::SeqCst);
                    }
                }
            });
        }

        for round in 0..500 {
            let (core, max) = if round % 2 == 0 { (50, 60) } else { (2, 4) };
            manager.update_config(&intent("orderPool", core, max)).unwrap();
        }
        done.store(true, Ordering::SeqCst);
    });

    assert!(!violations.load(Ordering::SeqCst));
}

#[test]
fn test_concurrent_updates_of_one_pool_end_consistent() {
    let manager = manager(&[("orderPool", 2, 4)]);

    thread::scope(|scope| {
        for worker in 0..8usize {
            let manager = &manager;
            scope.spawn(move || {
                for step in 0..100usize {
                    let core = (worker * 7 + step) % 40;
                    let max = core + 1 + step % 5;
                    manager.update_config(&intent("orderPool", core, max)).unwrap();
                }
            });
        }
    });

    assert!(manager.query_by_name("orderPool").unwrap().is_consistent());
}

#[tokio::test]
async fn test_bootstrap_with_empty_registry_keeps_defaults() {
    let manager = manager(&[("orderPool", 5, 10)]);
    let registry = MemoryRegistry::new();

    let applied = manager.bootstrap(&registry).await.unwrap();

    assert_eq!(applied, 0);
    let current = manager.query_by_name("orderPool").unwrap();
    assert_eq!((current.core_pool_size, current.maximum_pool_size), (5, 10));
}

#[tokio::test]
async fn test_bootstrap_applies_stored_configs() {
    let manager = manager(&[("orderPool", 5, 10), ("paymentPool", 1, 2)]);
    let registry = MemoryRegistry::new();
    registry
        .put_config(&intent("orderPool", 20, 30), dynpool::keys::CONFIG_TTL)
        .await
        .unwrap();

    let applied = manager.bootstrap(&registry).await.unwrap();

    assert_eq!(applied, 1);
    let order = manager.query_by_name("orderPool").unwrap();
    assert_eq!((order.core_pool_size, order.maximum_pool_size), (20, 30));
    let payment = manager.query_by_name("paymentPool").unwrap();
    assert_eq!((payment.core_pool_size, payment.maximum_pool_size), (1, 2));
}

#[tokio::test]
async fn test_bootstrap_skips_inconsistent_stored_config() {
    let manager = manager(&[("orderPool", 5, 10)]);
    let registry = MemoryRegistry::new();
    registry
        .put_config(&intent("orderPool", 50, 10), dynpool::keys::CONFIG_TTL)
        .await
        .unwrap();

    assert_eq!(manager.bootstrap(&registry).await.unwrap(), 0);
    let current = manager.query_by_name("orderPool").unwrap();
    assert_eq!((current.core_pool_size, current.maximum_pool_size), (5, 10));
}

#[tokio::test]
async fn test_bootstrap_reports_registry_failure() {
    let manager = manager(&[("orderPool", 5, 10)]);
    let registry = MemoryRegistry::new();
    registry.set_available(false);

    let err = manager.bootstrap(&registry).await.unwrap_err();

    assert!(matches!(err, DynamicPoolError::Registry(ref e) if e.is_transient()));
    let current = manager.query_by_name("orderPool").unwrap();
    assert_eq!((current.core_pool_size, current.maximum_pool_size), (5, 10));
}

proptest! {
    #[test]
    fn prop_consistent_update_is_applied(
        start_core in 0usize..32,
        start_extra in 1usize..32,
        core in 0usize..64,
        extra in 1usize..64,
    ) {
        let manager = WorkerPoolManager::new(
            APP,
            [controller("orderPool", start_core, start_core + start_extra)],
        );

        let applied = manager.update_config(&intent("orderPool", core, core + extra)).unwrap();
        let queried = manager.query_by_name("orderPool").unwrap();

        prop_assert_eq!(&applied, &queried);
        prop_assert_eq!(queried.core_pool_size, core);
        prop_assert_eq!(queried.maximum_pool_size, core + extra);
    }

    #[test]
    fn prop_inconsistent_update_leaves_pool_unchanged(
        start_core in 0usize..32,
        start_extra in 1usize..32,
        max in 0usize..64,
        excess in 1usize..64,
    ) {
        let manager = WorkerPoolManager::new(
            APP,
            [controller("orderPool", start_core, start_core + start_extra)],
        );

        let result = manager.update_config(&intent("orderPool", max + excess, max));
        let is_validation_error = matches!(result, Err(DynamicPoolError::Validation { .. }));
        prop_assert!(is_validation_error);

        let current = manager.query_by_name("orderPool").unwrap();
        prop_assert_eq!(current.core_pool_size, start_core);
        prop_assert_eq!(current.maximum_pool_size, start_core + start_extra);
    }
}
