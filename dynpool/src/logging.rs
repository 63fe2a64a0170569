// Logging for dynpool
//
// Built on the `tracing` ecosystem. The host process installs a subscriber
// once (or brings its own); every dynpool component then logs inside a span it
// owns, so events from the change listener, the stats reporter and the pools
// can be told apart and filtered by target.
//
// # Usage Examples
//
// ```rust
// use dynpool::logging;
//
// // INFO level, human-readable console output
// logging::init(logging::LogConfig::default());
//
// // Or one of the presets
// logging::init_development();
// logging::init_production();
// ```
//
// Components pick up a span at construction and can be handed a different one:
//
// ```rust
// let span = dynpool::component_span!("stats_reporter", "svcA");
// let _guard = span.enter();
// dynpool::log_registry!("put_list", "ok", pools = 3);
// ```

use std::io;
use std::sync::Once;
use tracing::{Level, Subscriber};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Configuration for the logging system
///
/// # Examples
///
/// ```rust
/// use dynpool::logging::LogConfig;
/// use tracing::Level;
///
/// let config = LogConfig {
///     level: Level::DEBUG,
///     target_filters: Some("dynpool::listener=trace".to_string()),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: Level,
    /// Whether to use JSON format for logs
    pub json_format: bool,
    /// Whether to include file and line information
    pub show_file_line: bool,
    /// Whether to include thread name/id; pool workers are named `<pool>-worker-<n>`
    pub show_thread_info: bool,
    /// Whether to include timestamps
    pub show_time: bool,
    /// Target filter expressions (format: "target=level,target2=level2,...")
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_file_line: true,
            show_thread_info: true,
            show_time: true,
            target_filters: None,
        }
    }
}

// Initialization guard to ensure we only initialize once
static INIT: Once = Once::new();

fn env_filter(config: &LogConfig) -> EnvFilter {
    let mut env_filter = EnvFilter::from_default_env().add_directive(config.level.into());

    if let Some(filters) = &config.target_filters {
        for filter in filters.split(',') {
            if let Ok(directive) = filter.trim().parse() {
                env_filter = env_filter.add_directive(directive);
            }
        }
    }
    env_filter
}

/// Initialize the logging system with the given configuration
///
/// Installs the global tracing subscriber. Safe to call multiple times; only
/// the first call takes effect. Hosts that install their own subscriber do not
/// need to call this at all.
pub fn init(config: LogConfig) {
    INIT.call_once(|| {
        let registry = tracing_subscriber::registry().with(env_filter(&config));

        let subscriber: Box<dyn Subscriber + Send + Sync> = match (config.json_format, config.show_time) {
            (true, _) => Box::new(registry.with(fmt::layer().json().flatten_event(true))),
            (false, true) => Box::new(
                registry.with(
                    fmt::layer()
                        .with_ansi(atty::is(atty::Stream::Stdout))
                        .with_file(config.show_file_line)
                        .with_line_number(config.show_file_line)
                        .with_thread_names(config.show_thread_info)
                        .with_thread_ids(config.show_thread_info),
                ),
            ),
            (false, false) => Box::new(
                registry.with(
                    fmt::layer()
                        .without_time()
                        .with_ansi(atty::is(atty::Stream::Stdout))
                        .with_file(config.show_file_line)
                        .with_line_number(config.show_file_line)
                        .with_thread_names(config.show_thread_info)
                        .with_thread_ids(config.show_thread_info),
                ),
            ),
        };

        set_global_subscriber(subscriber);
    });
}

// Helper function to set the global subscriber
fn set_global_subscriber<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error setting global tracing subscriber: {}", err);
    }
}

/// Open `path` for appending, creating it if needed.
pub fn file_writer(path: &str) -> io::Result<Box<dyn io::Write + Send + Sync + 'static>> {
    use std::fs::OpenOptions;

    let file = OpenOptions::new().create(true).append(true).open(path)?;

    Ok(Box::new(file))
}

/// Initialize logging with both console and file output
///
/// The file is checked for writability up front so a bad path is reported to
/// the caller instead of silently falling back to stderr.
///
/// # Arguments
/// * `config` - Base logging configuration
/// * `log_file` - Path to the log file
pub fn init_with_file(config: LogConfig, log_file: &str) -> Result<(), io::Error> {
    file_writer(log_file)?;

    INIT.call_once(|| {
        let console_layer = fmt::layer()
            .with_ansi(atty::is(atty::Stream::Stdout))
            .with_file(config.show_file_line)
            .with_line_number(config.show_file_line)
            .with_thread_names(config.show_thread_info)
            .with_thread_ids(config.show_thread_info);

        let log_file_path = log_file.to_string();
        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(move || match file_writer(&log_file_path) {
                Ok(writer) => writer,
                Err(_) => Box::new(std::io::stderr()),
            })
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_thread_ids(true);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter(&config))
            .with(console_layer)
            .with(file_layer);

        set_global_subscriber(subscriber);
    });

    Ok(())
}

/// DEBUG level, TRACE for the change listener, colored output with locations.
pub fn init_development() {
    init(LogConfig {
        level: Level::DEBUG,
        target_filters: Some("dynpool=debug,dynpool::listener=trace".to_string()),
        ..Default::default()
    });
}

/// INFO level JSON output without file/line information.
pub fn init_production() {
    init(LogConfig {
        level: Level::INFO,
        json_format: true,
        show_file_line: false,
        show_thread_info: true,
        show_time: true,
        target_filters: None,
    });
}

/// WARN level, compact plain output for test runs.
pub fn init_test() {
    init(LogConfig {
        level: Level::WARN,
        json_format: false,
        show_file_line: true,
        show_thread_info: false,
        show_time: false,
        target_filters: None,
    });
}

/// Span owned by a control-plane component for one application.
///
/// # Examples
///
/// ```rust
/// let span = dynpool::component_span!("change_listener", "svcA");
/// let span = dynpool::component_span!("stats_reporter", "svcA", interval_ms = 20_000u64);
/// ```
#[macro_export]
macro_rules! component_span {
    ($component:expr, $app:expr) => {
        tracing::info_span!("dynpool", component = $component, app = %$app)
    };
    ($component:expr, $app:expr, $($fields:tt)*) => {
        tracing::info_span!("dynpool", component = $component, app = %$app, $($fields)*)
    };
}

/// Span for work done on behalf of one pool.
#[macro_export]
macro_rules! pool_span {
    ($pool:expr) => {
        tracing::debug_span!("pool", name = %$pool)
    };
    ($pool:expr, $($fields:tt)*) => {
        tracing::debug_span!("pool", name = %$pool, $($fields)*)
    };
}

/// Log a pool sizing or lifecycle event
///
/// ```rust
/// dynpool::log_pool_event!("orderPool", "resized", core = 20, max = 30);
/// ```
#[macro_export]
macro_rules! log_pool_event {
    ($pool:expr, $event:expr) => {
        tracing::info!(pool = %$pool, event = $event)
    };
    ($pool:expr, $event:expr, $($fields:tt)*) => {
        tracing::info!(pool = %$pool, event = $event, $($fields)*)
    };
}

/// Log a registry round trip
#[macro_export]
macro_rules! log_registry {
    ($operation:expr, $status:expr) => {
        tracing::debug!(operation = $operation, status = $status)
    };
    ($operation:expr, $status:expr, $($fields:tt)*) => {
        tracing::debug!(operation = $operation, status = $status, $($fields)*)
    };
}

/// Log error events
///
/// ```rust
/// let error = std::io::Error::new(std::io::ErrorKind::Other, "connection reset");
/// dynpool::log_error!(error, operation = "put_list");
/// ```
#[macro_export]
macro_rules! log_error {
    ($error:expr) => {
        tracing::error!(error = %$error)
    };
    ($error:expr, $($fields:tt)*) => {
        tracing::error!(error = %$error, $($fields)*)
    };
}

/// Capture the current dispatcher, e.g. to install it on pool worker threads.
#[inline]
pub fn current_subscriber() -> tracing::Dispatch {
    tracing::dispatcher::get_default(|d| d.clone())
}
