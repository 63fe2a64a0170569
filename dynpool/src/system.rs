use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn, Span};

use dynpool_api::{DynamicPoolError, PoolController, Registry, Subscription};

use crate::admin::ConfigAdmin;
use crate::config::{resolve_app_name, DynamicPoolConfig};
use crate::listener::ChangeListener;
use crate::manager::WorkerPoolManager;
use crate::reporter::StatsReporter;

/// Running control plane of one application
///
/// Wires the manager, the change listener and the stats reporter over one
/// registry. The host keeps ownership of its pools; they are only shared
/// with the manager.
///
/// # Lifecycle
/// 1. [`start`](DynamicPoolSystem::start) resolves the application name,
///    restores persisted configs, subscribes to changes and starts reporting
/// 2. [`shutdown`](DynamicPoolSystem::shutdown) stops reporting and
///    unsubscribes; the pools themselves keep running
pub struct DynamicPoolSystem {
    app_name: String,
    manager: Arc<WorkerPoolManager>,
    listener: Arc<ChangeListener>,
    reporter: StatsReporter,
    admin: ConfigAdmin,
    subscription: Subscription,
    reporter_task: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
    span: Span,
}

impl DynamicPoolSystem {
    /// Start the control plane for `pools`.
    ///
    /// # Errors
    /// * [`DynamicPoolError::Config`] - invalid `config`
    /// * [`DynamicPoolError::Registry`] - subscribing failed, or restoring
    ///   stored configs failed and `fail_fast_bootstrap` is set
    pub async fn start<I, S>(
        config: DynamicPoolConfig,
        registry: Arc<dyn Registry>,
        pools: I,
    ) -> Result<Self, DynamicPoolError>
    where
        I: IntoIterator<Item = (S, Arc<dyn PoolController>)>,
        S: Into<String>,
    {
        config.validate()?;
        let app_name = resolve_app_name(config.app_name.as_deref());
        let span = crate::component_span!("system", app_name);

        let manager = Arc::new(WorkerPoolManager::new(app_name.clone(), pools));
        match manager.bootstrap(registry.as_ref()).await {
            Ok(applied) => span.in_scope(|| info!(applied, "stored configs restored")),
            Err(err) if config.fail_fast_bootstrap => return Err(err),
            Err(err) => span.in_scope(|| {
                warn!(error = %err, "could not restore all stored configs, continuing with defaults")
            }),
        }

        let listener = Arc::new(ChangeListener::new(
            app_name.clone(),
            Arc::clone(&manager),
            Arc::clone(&registry),
            config.config_ttl,
        ));
        let subscription = listener.subscribe().await?;

        let reporter = StatsReporter::new(
            app_name.clone(),
            Arc::clone(&manager),
            Arc::clone(&registry),
            config.report_interval,
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let reporter_task = reporter.spawn(shutdown_rx);

        let admin = ConfigAdmin::new(registry).with_ttl(config.config_ttl);

        span.in_scope(|| info!(pools = manager.len(), "dynamic pool system started"));

        Ok(Self {
            app_name,
            manager,
            listener,
            reporter,
            admin,
            subscription,
            reporter_task,
            shutdown_tx,
            span,
        })
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn manager(&self) -> &Arc<WorkerPoolManager> {
        &self.manager
    }

    pub fn listener(&self) -> &Arc<ChangeListener> {
        &self.listener
    }

    pub fn reporter(&self) -> &StatsReporter {
        &self.reporter
    }

    pub fn admin(&self) -> &ConfigAdmin {
        &self.admin
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Stop reporting and listening. Waits for the reporter to finish its
    /// current tick.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        self.subscription.unsubscribe();
        if let Err(err) = self.reporter_task.await {
            if !err.is_cancelled() {
                self.span
                    .in_scope(|| warn!(error = %err, "stats reporter ended abnormally"));
            }
        }
        self.span.in_scope(|| info!("dynamic pool system stopped"));
    }
}

impl std::fmt::Debug for DynamicPoolSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicPoolSystem")
            .field("app_name", &self.app_name)
            .field("manager", &self.manager)
            .field("subscription", &self.subscription)
            .finish()
    }
}
