use std::sync::Arc;
use std::time::Duration;

use tracing::{info, Span};

use dynpool_api::keys::CONFIG_TTL;
use dynpool_api::{DynamicPoolError, Registry, ThreadPoolConfigEntity};

/// Operator side of the control plane.
///
/// An adjustment is two registry writes: the desired config is stored so
/// instances starting later pick it up, then published so running instances
/// apply it now. Nothing is applied locally; a process that also owns the
/// pool receives the change through its own subscription.
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use dynpool::{ConfigAdmin, MemoryRegistry, ThreadPoolConfigEntity};
/// # async fn run() -> Result<(), dynpool::DynamicPoolError> {
/// let admin = ConfigAdmin::new(Arc::new(MemoryRegistry::new()));
/// admin
///     .adjust(&ThreadPoolConfigEntity::new("svcA", "orderPool").with_sizes(20, 30))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConfigAdmin {
    registry: Arc<dyn Registry>,
    config_ttl: Duration,
    span: Span,
}

impl ConfigAdmin {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self {
            registry,
            config_ttl: CONFIG_TTL,
            span: tracing::info_span!("dynpool", component = "config_admin"),
        }
    }

    pub fn with_ttl(mut self, config_ttl: Duration) -> Self {
        self.config_ttl = config_ttl;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Store and publish a resize intent.
    ///
    /// # Errors
    /// * [`DynamicPoolError::Validation`] - `core > max`; nothing is written
    /// * [`DynamicPoolError::Registry`] - the store or the publish failed
    pub async fn adjust(&self, entity: &ThreadPoolConfigEntity) -> Result<(), DynamicPoolError> {
        if !entity.is_consistent() {
            return Err(DynamicPoolError::Validation {
                pool: entity.thread_pool_name.clone(),
                core: entity.core_pool_size,
                max: entity.maximum_pool_size,
            });
        }

        self.registry.put_config(entity, self.config_ttl).await?;
        self.registry.publish(&entity.app_name, entity).await?;

        self.span.in_scope(|| {
            info!(
                app = %entity.app_name,
                pool = %entity.thread_pool_name,
                core = entity.core_pool_size,
                max = entity.maximum_pool_size,
                "resize published"
            )
        });
        Ok(())
    }

    /// The stored parameter entry of one pool.
    pub async fn current(
        &self,
        app_name: &str,
        pool_name: &str,
    ) -> Result<Option<ThreadPoolConfigEntity>, DynamicPoolError> {
        Ok(self.registry.get_config(app_name, pool_name).await?)
    }
}

impl std::fmt::Debug for ConfigAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigAdmin")
            .field("config_ttl", &self.config_ttl)
            .finish()
    }
}
