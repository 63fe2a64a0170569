use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn, Instrument, Span};

use dynpool_api::{
    DynamicPoolError, PoolController, PoolError, Registry, RegistryError, ThreadPoolConfigEntity,
};

/// A pool handed to the manager plus the lock serializing its resizes.
struct ManagedPool {
    controller: Arc<dyn PoolController>,
    update_lock: Mutex<()>,
}

/// Owner of the live pools of one application
///
/// The manager never creates pools: the host builds them and hands them over
/// by name. The set of pools is fixed at construction, so lookups need no
/// lock.
///
/// # Thread Safety
/// - Resizes of one pool are serialized by a per-pool lock; different pools
///   resize in parallel
/// - Queries never take that lock; they only read the pool's own consistent
///   snapshot, so they are not blocked by a resize in progress
///
/// # Resize Ordering
/// A pool enforces `core <= max` on every single setter call. The manager
/// therefore picks the order of the two calls from the current and target
/// values: raising core past the current maximum raises the maximum first,
/// anything else lowers or sets core first. No caller can observe `core > max`.
pub struct WorkerPoolManager {
    app_name: String,
    pools: BTreeMap<String, ManagedPool>,
    span: Span,
}

impl WorkerPoolManager {
    /// # Arguments
    /// * `app_name` - Resolved application identity
    /// * `pools` - Running pools by name; a repeated name keeps the last pool
    pub fn new<I, S>(app_name: impl Into<String>, pools: I) -> Self
    where
        I: IntoIterator<Item = (S, Arc<dyn PoolController>)>,
        S: Into<String>,
    {
        let app_name = app_name.into();
        let pools = pools
            .into_iter()
            .map(|(name, controller)| {
                (
                    name.into(),
                    ManagedPool {
                        controller,
                        update_lock: Mutex::new(()),
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();
        let span = crate::component_span!("pool_manager", app_name);

        Self {
            app_name,
            pools,
            span,
        }
    }

    /// Log inside `span` instead of the default component span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn pool_names(&self) -> impl Iterator<Item = &str> {
        self.pools.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Apply persisted configs to the local pools.
    ///
    /// A pool without a stored record, or with a record where `core > max`,
    /// keeps its current sizing. A registry failure for one pool does not stop
    /// the others.
    ///
    /// # Returns
    /// Number of pools resized
    ///
    /// # Errors
    /// The first registry failure, after all pools were attempted
    pub async fn bootstrap(&self, registry: &dyn Registry) -> Result<usize, DynamicPoolError> {
        async {
            let mut applied = 0usize;
            let mut first_failure: Option<RegistryError> = None;

            for name in self.pools.keys() {
                match registry.get_config(&self.app_name, name).await {
                    Ok(Some(stored)) if stored.is_consistent() => {
                        let stored = ThreadPoolConfigEntity {
                            thread_pool_name: name.clone(),
                            ..stored
                        };
                        match self.update_config(&stored) {
                            Ok(current) => {
                                applied += 1;
                                crate::log_pool_event!(
                                    name,
                                    "restored",
                                    core = current.core_pool_size,
                                    max = current.maximum_pool_size
                                );
                            }
                            Err(err) => warn!(pool = %name, error = %err, "failed to restore stored config"),
                        }
                    }
                    Ok(Some(stored)) => warn!(
                        pool = %name,
                        core = stored.core_pool_size,
                        max = stored.maximum_pool_size,
                        "ignoring stored config with core above maximum"
                    ),
                    Ok(None) => debug!(pool = %name, "no stored config, keeping defaults"),
                    Err(err) => {
                        warn!(pool = %name, error = %err, "failed to load stored config");
                        if first_failure.is_none() {
                            first_failure = Some(err);
                        }
                    }
                }
            }

            info!(pools = self.pools.len(), applied, "bootstrap finished");
            match first_failure {
                Some(err) => Err(err.into()),
                None => Ok(applied),
            }
        }
        .instrument(self.span.clone())
        .await
    }

    /// Snapshot of every pool, ordered by pool name.
    pub fn query_all(&self) -> Vec<ThreadPoolConfigEntity> {
        self.pools
            .iter()
            .map(|(name, pool)| self.snapshot(name, pool))
            .collect()
    }

    /// Snapshot of one pool.
    ///
    /// # Errors
    /// * [`DynamicPoolError::NotFound`] - the pool is not owned by this process
    pub fn query_by_name(&self, pool_name: &str) -> Result<ThreadPoolConfigEntity, DynamicPoolError> {
        let pool = self.pool(pool_name)?;
        Ok(self.snapshot(pool_name, pool))
    }

    /// Resize the pool named by `entity` to its core and maximum sizes.
    ///
    /// Only the sizing fields of `entity` are read.
    ///
    /// # Returns
    /// The snapshot taken after the resize
    ///
    /// # Errors
    /// * [`DynamicPoolError::Validation`] - `core > max`; the pool is unchanged
    /// * [`DynamicPoolError::NotFound`] - the pool is not owned by this process
    /// * [`DynamicPoolError::Pool`] - `max == 0`, or the pool refused a size
    pub fn update_config(
        &self,
        entity: &ThreadPoolConfigEntity,
    ) -> Result<ThreadPoolConfigEntity, DynamicPoolError> {
        let _entered = self.span.enter();
        let name = entity.thread_pool_name.as_str();
        let (core, max) = (entity.core_pool_size, entity.maximum_pool_size);

        if !entity.is_consistent() {
            warn!(pool = %name, core, max, "rejecting config with core above maximum");
            return Err(DynamicPoolError::Validation {
                pool: name.to_string(),
                core,
                max,
            });
        }
        let pool = self.pool(name)?;
        if max == 0 {
            warn!(pool = %name, core, max, "rejecting config with zero maximum");
            return Err(PoolError::InvalidSize { core, max }.into());
        }

        let _guard = pool
            .update_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let controller = &pool.controller;
        let current = controller.stats();

        if core > current.maximum_pool_size {
            controller.set_maximum_pool_size(max)?;
            controller.set_core_pool_size(core)?;
        } else {
            controller.set_core_pool_size(core)?;
            controller.set_maximum_pool_size(max)?;
        }

        let applied = self.snapshot(name, pool);
        crate::log_pool_event!(
            name,
            "resized",
            from_core = current.core_pool_size,
            from_max = current.maximum_pool_size,
            core = applied.core_pool_size,
            max = applied.maximum_pool_size
        );
        Ok(applied)
    }

    fn pool(&self, pool_name: &str) -> Result<&ManagedPool, DynamicPoolError> {
        self.pools
            .get(pool_name)
            .ok_or_else(|| DynamicPoolError::NotFound(pool_name.to_string()))
    }

    fn snapshot(&self, name: &str, pool: &ManagedPool) -> ThreadPoolConfigEntity {
        ThreadPoolConfigEntity::from_stats(&self.app_name, name, &pool.controller.stats())
    }
}

impl fmt::Debug for WorkerPoolManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPoolManager")
            .field("app_name", &self.app_name)
            .field("pools", &self.pools.keys().collect::<Vec<_>>())
            .finish()
    }
}
