use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn, Instrument, Span};

use dynpool_api::keys::CONFIG_TTL;
use dynpool_api::{
    handler_fn, ChangeHandler, DynamicPoolError, Registry, RegistryError, Subscription,
    ThreadPoolConfigEntity,
};

use crate::manager::WorkerPoolManager;

/// Applies change events from the registry to the local pools.
///
/// Every delivered entity is applied through the manager, after which the
/// listener re-reports: the full pool list always, and the parameter entry of
/// the targeted pool when this process owns it. The stored entry is a fresh
/// snapshot taken after the apply, so it reflects whatever concurrent updates
/// landed in between.
///
/// Failures never leave the handler. A change event is not retried; the next
/// periodic report or operator publish converges the state.
#[derive(Clone)]
pub struct ChangeListener {
    app_name: String,
    manager: Arc<WorkerPoolManager>,
    registry: Arc<dyn Registry>,
    config_ttl: Duration,
    span: Span,
}

impl ChangeListener {
    pub fn new(
        app_name: impl Into<String>,
        manager: Arc<WorkerPoolManager>,
        registry: Arc<dyn Registry>,
        config_ttl: Duration,
    ) -> Self {
        let app_name = app_name.into();
        let span = crate::component_span!("change_listener", app_name);
        Self {
            app_name,
            manager,
            registry,
            config_ttl,
            span,
        }
    }

    /// Listener writing parameter entries with the default expiry.
    pub fn with_default_ttl(
        app_name: impl Into<String>,
        manager: Arc<WorkerPoolManager>,
        registry: Arc<dyn Registry>,
    ) -> Self {
        Self::new(app_name, manager, registry, CONFIG_TTL)
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Handle one change event.
    pub async fn on_message(&self, entity: ThreadPoolConfigEntity) {
        let span = self.span.clone();
        async move {
            let pool = entity.thread_pool_name.clone();
            debug!(
                pool = %pool,
                core = entity.core_pool_size,
                max = entity.maximum_pool_size,
                "change received"
            );

            match self.manager.update_config(&entity) {
                Ok(applied) => info!(
                    pool = %pool,
                    core = applied.core_pool_size,
                    max = applied.maximum_pool_size,
                    "change applied"
                ),
                Err(err @ DynamicPoolError::Validation { .. }) => {
                    warn!(pool = %pool, error = %err, "change rejected")
                }
                Err(DynamicPoolError::NotFound(_)) => {
                    debug!(pool = %pool, "change targets a pool this process does not own")
                }
                Err(err) => crate::log_error!(err, pool = %pool, "change could not be applied"),
            }

            self.report(&pool).await;
        }
        .instrument(span)
        .await
    }

    /// Wrap this listener as a registry handler.
    pub fn handler(self: &Arc<Self>) -> ChangeHandler {
        let listener = Arc::clone(self);
        handler_fn(move |entity| {
            let listener = Arc::clone(&listener);
            async move { listener.on_message(entity).await }
        })
    }

    /// Subscribe this listener to the change channel of its application.
    pub async fn subscribe(self: &Arc<Self>) -> Result<Subscription, RegistryError> {
        let subscription = self
            .registry
            .subscribe(&self.app_name, self.handler())
            .await?;
        self.span.in_scope(|| {
            info!(
                channel = %subscription.channel(),
                subscription = %subscription.id(),
                "listening for changes"
            )
        });
        Ok(subscription)
    }

    async fn report(&self, pool: &str) {
        let snapshot = self.manager.query_all();
        match self.registry.put_list(&self.app_name, &snapshot).await {
            Ok(()) => crate::log_registry!("put_list", "ok", pools = snapshot.len()),
            Err(err) => error!(error = %err, "failed to report pool list"),
        }

        let Ok(current) = self.manager.query_by_name(pool) else {
            return;
        };
        match self.registry.put_config(&current, self.config_ttl).await {
            Ok(()) => crate::log_registry!("put_config", "ok", pool = %pool),
            Err(err) => error!(pool = %pool, error = %err, "failed to store pool config"),
        }
    }
}

impl std::fmt::Debug for ChangeListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeListener")
            .field("app_name", &self.app_name)
            .field("config_ttl", &self.config_ttl)
            .finish()
    }
}
