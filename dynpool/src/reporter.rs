use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn, Instrument, Span};

use dynpool_api::{Registry, RegistryError};

use crate::manager::WorkerPoolManager;

/// Periodically republishes the state of every pool.
///
/// The report doubles as a liveness signal: it runs whether or not any
/// change arrived. A failed tick is logged and skipped.
#[derive(Clone)]
pub struct StatsReporter {
    app_name: String,
    manager: Arc<WorkerPoolManager>,
    registry: Arc<dyn Registry>,
    interval: Duration,
    span: Span,
}

/// Shortest accepted report interval.
pub const MIN_REPORT_INTERVAL: Duration = Duration::from_millis(1);

impl StatsReporter {
    /// An `interval` below [`MIN_REPORT_INTERVAL`] is raised to it.
    pub fn new(
        app_name: impl Into<String>,
        manager: Arc<WorkerPoolManager>,
        registry: Arc<dyn Registry>,
        interval: Duration,
    ) -> Self {
        let app_name = app_name.into();
        let span = crate::component_span!("stats_reporter", app_name);
        if interval < MIN_REPORT_INTERVAL {
            span.in_scope(|| {
                warn!(
                    requested_ms = interval.as_millis() as u64,
                    "report interval too short, using {}ms",
                    MIN_REPORT_INTERVAL.as_millis()
                )
            });
        }
        let interval = interval.max(MIN_REPORT_INTERVAL);
        Self {
            app_name,
            manager,
            registry,
            interval,
            span,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Snapshot all pools and append the report.
    ///
    /// # Returns
    /// Number of pools reported
    pub async fn report_once(&self) -> Result<usize, RegistryError> {
        let snapshot = self.manager.query_all();
        self.registry.put_list(&self.app_name, &snapshot).await?;
        crate::log_registry!("put_list", "ok", pools = snapshot.len());
        Ok(snapshot.len())
    }

    /// Run the reporting loop until `shutdown` turns true or its sender is
    /// dropped.
    ///
    /// The first report is sent immediately.
    pub fn spawn(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let reporter = self.clone();
        let span = self.span.clone();
        tokio::spawn(
            async move {
                let mut ticker = tokio::time::interval(reporter.interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                info!(interval_ms = reporter.interval.as_millis() as u64, "stats reporter started");

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(err) = reporter.report_once().await {
                                warn!(error = %err, "stats report failed, skipping tick");
                            }
                        }
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }

                debug!("stats reporter stopped");
            }
            .instrument(span),
        )
    }
}

impl std::fmt::Debug for StatsReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsReporter")
            .field("app_name", &self.app_name)
            .field("interval", &self.interval)
            .finish()
    }
}
