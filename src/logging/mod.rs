//! Logging infrastructure - structured tracing for the heap manager
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable log levels via environment
//! - Zero-cost when disabled
//! - Console output (human-readable or JSON) and optional file output

use once_cell::sync::OnceCell;
use std::io;
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

// Re-export tracing macros for use throughout the crate
pub use tracing::{debug, error, info, trace, warn};

/// Global logging state
static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Keeps the non-blocking file writer flushing until process exit
static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Log file path, if file output is wanted
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

        // MSGC_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level_str) = std::env::var("MSGC_LOG_LEVEL") {
            config.level = parse_level(&level_str);
        }

        // MSGC_LOG_FILE: path to log file
        if let Ok(path) = std::env::var("MSGC_LOG_FILE") {
            config.log_path = Some(path);
        }

        config.json_format = std::env::var("MSGC_LOG_JSON").is_ok();
        config.show_spans = std::env::var("MSGC_LOG_SPANS").is_ok();

        config
    }

    /// Verbose config for debugging collector behaviour
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            log_path: None,
            json_format: false,
            show_spans: true,
        }
    }
}

fn parse_level(s: &str) -> Level {
    match s.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize logging with configuration from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration (first call wins)
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("marksweep={}", config.level.as_str().to_lowercase()))
        });

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let file_writer = config.log_path.as_deref().map(|path| {
            let path = Path::new(path);
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let file_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_else(|| "marksweep.log".into());
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
            let _ = FILE_GUARD.set(guard);
            writer
        });

        let file_layer = file_writer.map(|writer| {
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_span_events(span_events.clone())
        });

        let (json_layer, text_layer) = if config.json_format {
            let layer = fmt::layer()
                .json()
                .with_writer(io::stdout)
                .with_span_events(span_events.clone());
            (Some(layer), None)
        } else {
            let layer = fmt::layer()
                .with_writer(io::stdout)
                .with_span_events(span_events)
                .with_target(true)
                .with_line_number(cfg!(debug_assertions));
            (None, Some(layer))
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .with(text_layer)
            .with(file_layer)
            .try_init()
            .ok(); // Another subscriber may already be installed
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ============================================================================
// Heap-specific logging functions
// ============================================================================

/// Log a block allocation
#[inline]
pub fn log_allocation(tag: u8, size_words: usize, vaddr: u32) {
    trace!(
        event = "allocation",
        tag,
        size_words,
        vaddr,
        "Block allocated"
    );
}

/// Log collection start
pub fn log_gc_start(requested_words: usize) {
    info!(
        event = "gc_start",
        requested_words,
        "Starting garbage collection cycle"
    );
}

/// Log mark phase completion
pub fn log_gc_mark(marked: usize) {
    debug!(
        event = "gc_mark",
        blocks_marked = marked,
        "GC mark phase complete"
    );
}

/// Log sweep phase completion
pub fn log_gc_sweep(reclaimed: usize, free_words: usize) {
    debug!(
        event = "gc_sweep",
        blocks_reclaimed = reclaimed,
        free_words,
        "GC sweep phase complete"
    );
}

/// Log collection completion
pub fn log_gc_complete(duration_us: u64, reclaimed: usize, live: usize) {
    info!(
        event = "gc_complete",
        blocks_reclaimed = reclaimed,
        live_blocks = live,
        duration_us,
        "Garbage collection cycle complete"
    );
}

/// Log unrecoverable memory exhaustion
pub fn log_out_of_memory(requested_words: usize, free_words: usize) {
    error!(
        event = "out_of_memory",
        requested_words,
        free_words,
        "Cannot allocate memory, even after GC"
    );
}
