use std::time::Duration;

use dynpool_api::keys::CONFIG_TTL;
use dynpool_api::DynamicPoolError;

/// Application name used when the host supplies none.
pub const DEFAULT_APP_NAME: &str = "default";

pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(20);

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Reports kept on the shared pool list; older entries are trimmed.
pub const DEFAULT_MAX_LIST_LEN: usize = 1024;

/// Resolve the application identity supplied by the host.
///
/// An absent or blank name falls back to [`DEFAULT_APP_NAME`] with a warning.
/// Instances in this degraded mode share one change channel, so the fallback
/// keeps the process running but should be fixed in deployment.
pub fn resolve_app_name(app_name: Option<&str>) -> String {
    match app_name.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => {
            tracing::warn!(
                fallback = DEFAULT_APP_NAME,
                "no application name configured, pools will be registered under the fallback name"
            );
            DEFAULT_APP_NAME.to_string()
        }
    }
}

// --- Control Plane Configuration ---

/// Configuration for a [`DynamicPoolSystem`](crate::system::DynamicPoolSystem).
#[derive(Clone, Debug)]
pub struct DynamicPoolConfig {
    /// Application identity as supplied by the host; resolved with
    /// [`resolve_app_name`] at startup.
    pub app_name: Option<String>,

    /// Period of the stats reporter.
    pub report_interval: Duration,

    /// Expiry of pool parameter entries written to the registry.
    pub config_ttl: Duration,

    /// Abort startup when persisted configs cannot be loaded. When false the
    /// pools keep their default sizing and startup continues.
    pub fail_fast_bootstrap: bool,
}

impl Default for DynamicPoolConfig {
    fn default() -> Self {
        Self {
            app_name: None,
            report_interval: DEFAULT_REPORT_INTERVAL,
            config_ttl: CONFIG_TTL,
            fail_fast_bootstrap: false,
        }
    }
}

impl DynamicPoolConfig {
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    pub fn validate(&self) -> Result<(), DynamicPoolError> {
        if self.report_interval.is_zero() {
            return Err(DynamicPoolError::Config("report_interval must be non-zero".into()));
        }
        if self.config_ttl.is_zero() {
            return Err(DynamicPoolError::Config("config_ttl must be non-zero".into()));
        }
        Ok(())
    }
}

// --- Registry Connection Configuration ---

/// Connection tuning for [`RedisRegistry`](crate::registry::RedisRegistry).
///
/// None of these settings change what the registry does, only how available
/// and how fast it is.
#[derive(Clone, Debug)]
pub struct RedisRegistryConfig {
    pub host: String,

    pub port: u16,

    pub password: Option<String>,

    pub database: i64,

    /// Maximum number of commands in flight on the shared connection.
    pub pool_size: usize,

    /// Accepted and ignored. Commands share one multiplexed connection and
    /// each subscription opens its own, so there is no idle pool to size.
    /// Present so settings written for other clients of the same registry
    /// load unchanged.
    pub min_idle_size: usize,

    /// How long a command may wait for its response.
    pub idle_timeout: Duration,

    /// How long establishing a connection may take.
    pub connect_timeout: Duration,

    /// Retries after the first failed attempt of an operation.
    pub retry_attempts: u32,

    /// Pause between retries.
    pub retry_interval: Duration,

    /// Period of the background `PING`; zero disables it.
    pub ping_interval: Duration,

    /// Run the background `PING`.
    pub keep_alive: bool,

    /// Newest entries kept on the pool list after each report.
    pub max_list_len: usize,
}

impl Default for RedisRegistryConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            database: 0,
            pool_size: 64,
            min_idle_size: 10,
            idle_timeout: Duration::from_millis(10_000),
            connect_timeout: Duration::from_millis(10_000),
            retry_attempts: 3,
            retry_interval: Duration::from_millis(1_000),
            ping_interval: Duration::ZERO,
            keep_alive: true,
            max_list_len: DEFAULT_MAX_LIST_LEN,
        }
    }
}

impl RedisRegistryConfig {
    /// Connection URL, `redis://[:password@]host:port/db`.
    pub fn url(&self) -> String {
        match self.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.database
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.database),
        }
    }

    pub fn validate(&self) -> Result<(), DynamicPoolError> {
        if self.host.trim().is_empty() {
            return Err(DynamicPoolError::Config("redis host must not be empty".into()));
        }
        if self.pool_size == 0 {
            return Err(DynamicPoolError::Config("redis pool_size must be at least 1".into()));
        }
        if self.max_list_len == 0 {
            return Err(DynamicPoolError::Config("redis max_list_len must be at least 1".into()));
        }
        Ok(())
    }
}

// --- Worker Pool Configuration ---

/// Initial configuration of a [`WorkerPool`](crate::pool::WorkerPool).
#[derive(Clone, Debug)]
pub struct WorkerPoolConfig {
    /// Pool name; also the prefix of worker thread names.
    pub name: String,

    /// Workers kept alive while idle.
    pub core_pool_size: usize,

    /// Upper bound on workers, used once the queue is full.
    pub maximum_pool_size: usize,

    /// Bound of the job queue.
    pub queue_capacity: usize,

    /// How long a worker above the core size waits for a job before retiring.
    pub keep_alive: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        let cpus = num_cpus::get();
        Self {
            name: "worker-pool".to_string(),
            core_pool_size: cpus,
            maximum_pool_size: cpus * 2,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            keep_alive: DEFAULT_KEEP_ALIVE,
        }
    }
}

impl WorkerPoolConfig {
    pub fn new(name: impl Into<String>, core_pool_size: usize, maximum_pool_size: usize) -> Self {
        Self {
            name: name.into(),
            core_pool_size,
            maximum_pool_size,
            ..Default::default()
        }
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn validate(&self) -> Result<(), DynamicPoolError> {
        if self.name.trim().is_empty() {
            return Err(DynamicPoolError::Config("pool name must not be empty".into()));
        }
        if self.maximum_pool_size == 0 {
            return Err(DynamicPoolError::Config(format!(
                "pool {}: maximum_pool_size must be at least 1",
                self.name
            )));
        }
        if self.core_pool_size > self.maximum_pool_size {
            return Err(DynamicPoolError::Config(format!(
                "pool {}: core_pool_size {} exceeds maximum_pool_size {}",
                self.name, self.core_pool_size, self.maximum_pool_size
            )));
        }
        if self.queue_capacity == 0 {
            return Err(DynamicPoolError::Config(format!(
                "pool {}: queue_capacity must be at least 1",
                self.name
            )));
        }
        Ok(())
    }
}
