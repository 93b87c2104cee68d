//! Logging infrastructure - structured tracing throughout the interop layer
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable log levels
//! - Zero-cost when disabled
//! - Console or file output, human-readable or JSON

use once_cell::sync::OnceCell;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

pub use tracing::{debug, error, info, trace, warn, Level};

use crate::guid::Guid;
use crate::result::ResultCode;
use core::ffi::c_void;

/// Global logging state
static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Keeps the non-blocking file writer flushing for the life of the process
static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Enable file logging
    pub file_output: bool,
    /// Log file path (if file_output enabled)
    pub log_path: Option<String>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_output: false,
            log_path: None,
            json_format: false,
            show_spans: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // VTINTEROP_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level_str) = std::env::var("VTINTEROP_LOG_LEVEL") {
            config.level = parse_level(&level_str);
        }

        // VTINTEROP_LOG_FILE: path to log file
        if let Ok(path) = std::env::var("VTINTEROP_LOG_FILE") {
            config.file_output = true;
            config.log_path = Some(path);
        }

        // VTINTEROP_LOG_JSON: enable JSON format
        config.json_format = std::env::var("VTINTEROP_LOG_JSON").is_ok();

        // VTINTEROP_LOG_SPANS: show span events
        config.show_spans = std::env::var("VTINTEROP_LOG_SPANS").is_ok();

        config
    }

    /// Verbose config for chasing refcount bugs
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            file_output: true,
            log_path: Some("vtinterop.log".to_string()),
            json_format: false,
            show_spans: true,
        }
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize logging with default configuration
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "vtinterop={}",
                config.level.as_str().to_lowercase()
            ))
        });

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let writer = match (config.file_output, config.log_path.as_deref()) {
            (true, Some(path)) => file_writer(Path::new(path)),
            _ => BoxMakeWriter::new(io::stdout),
        };

        let layer = fmt::layer()
            .with_writer(writer)
            .with_span_events(span_events)
            .with_target(true)
            .with_thread_ids(cfg!(debug_assertions))
            .with_line_number(cfg!(debug_assertions));

        // Another subscriber may already be installed (embedding host, tests)
        let registry = tracing_subscriber::registry().with(env_filter);
        let _ = if config.json_format {
            registry.with(layer.json()).try_init()
        } else {
            registry.with(layer).try_init()
        };
    });
}

fn file_writer(path: &Path) -> BoxMakeWriter {
    let directory = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "vtinterop.log".into());

    let appender = tracing_appender::rolling::never(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = FILE_GUARD.set(guard);
    BoxMakeWriter::new(writer)
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ============================================================================
// Interop-specific logging functions
// ============================================================================

/// Log an interface query issued through a foreign vtable
#[inline]
pub fn log_query_interface(pointer: *const c_void, iid: &Guid, code: ResultCode) {
    trace!(
        event = "query_interface",
        address = ?pointer,
        iid = %iid,
        code = %code,
        "QueryInterface returned"
    );
}

/// Log disposal of a foreign object
#[inline]
pub fn log_dispose(pointer: *const c_void, disposing: bool, released: bool) {
    trace!(
        event = "dispose",
        address = ?pointer,
        disposing,
        released,
        "Foreign object disposed"
    );
}

/// Log a live object reaching the finalize path
pub fn log_leak_warning(message: &str) {
    warn!(event = "leak_warning", "{}", message);
}

/// Log a callback container becoming callable from foreign code
pub fn log_shadow_bound(identity: *const c_void, facets: usize) {
    debug!(
        event = "shadow_bound",
        address = ?identity,
        facets,
        "Callback shadows bound"
    );
}

/// Log teardown of a callback container's shadows
pub fn log_shadow_disposed(identity: *const c_void) {
    debug!(
        event = "shadow_disposed",
        address = ?identity,
        "Callback shadows disposed"
    );
}

/// Log a callback failure translated into a status code
pub fn log_callback_error(method: &str, error: &str, code: ResultCode) {
    warn!(
        event = "callback_error",
        method,
        error,
        code = %code,
        "Callback failed; returning status to foreign caller"
    );
}

/// Log tracker contents at shutdown
pub fn log_live_objects(count: usize) {
    if count == 0 {
        info!(event = "live_objects", count, "No tracked foreign objects alive");
    } else {
        warn!(event = "live_objects", count, "Tracked foreign objects still alive");
    }
}
