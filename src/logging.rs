//! Structured JSONL logging to a file plus human-readable stderr output.
//!
//! - **JSONL to file** (`<state dir>/shortcuts-per-app/logs/shortcuts-per-app.jsonl`)
//! - **Compact to stderr** for whoever is watching the daemon
//!
//! # Usage
//!
//! ```rust,ignore
//! use shortcuts_per_app::logging::{self, LogOptions};
//!
//! // Keep the guard alive for the duration of the program
//! let _guard = logging::init(&LogOptions::default());
//!
//! tracing::info!(event_type = "focus", app = "firefox", "Overlay applied");
//! ```
//!
//! # JSONL Output Format
//!
//! ```json
//! {"timestamp":"2026-03-02T10:30:45.123Z","level":"INFO","target":"shortcuts_per_app::engine","fields":{"message":"Overlay applied","event_type":"remap","app":"firefox","entries":1}}
//! ```

use std::fs::{self, OpenOptions};
use std::io;
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE_NAME: &str = "shortcuts-per-app.jsonl";

/// Guard that must be kept alive for the duration of the program.
/// Dropping this guard will flush and close the log file.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Directory for the JSONL file; `None` uses `log_dir()`.
    pub dir: Option<PathBuf>,
    /// Filter used when `RUST_LOG` is unset.
    pub default_filter: String,
    /// Skip the file layer (one-shot CLI commands).
    pub stderr_only: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            dir: None,
            default_filter: "info".to_string(),
            stderr_only: false,
        }
    }
}

/// Initialize logging.
///
/// Returns a guard that MUST be kept alive for the duration of the program.
/// If the log file cannot be opened the daemon still runs with stderr only.
pub fn init(options: &LogOptions) -> LoggingGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&options.default_filter));

    let pretty_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(true)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .compact();

    let log_path = options.dir.clone().unwrap_or_else(log_dir).join(LOG_FILE_NAME);
    let file = if options.stderr_only {
        None
    } else {
        open_log_file(&log_path)
    };

    // Non-blocking so a slow disk never stalls the event loop
    let (json_layer, file_guard) = match file {
        Some(file) => {
            let (non_blocking_file, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .json()
                .with_writer(non_blocking_file)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false)
                .with_span_events(FmtSpan::NONE);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let file_logging = file_guard.is_some();
    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .init();

    if !file_logging {
        return LoggingGuard { _file_guard: None };
    }

    tracing::info!(
        event_type = "app_lifecycle",
        action = "started",
        log_path = %log_path.display(),
        "Logging initialized"
    );

    LoggingGuard {
        _file_guard: file_guard,
    }
}

fn open_log_file(path: &std::path::Path) -> Option<fs::File> {
    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("[LOGGING] Failed to create log directory: {}", e);
            return None;
        }
    }
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("[LOGGING] Failed to open log file {}: {}", path.display(), e);
            None
        }
    }
}

/// Default log directory (`$XDG_STATE_HOME/shortcuts-per-app/logs`).
pub fn log_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::cache_dir)
        .map(|d| d.join("shortcuts-per-app").join("logs"))
        .unwrap_or_else(|| std::env::temp_dir().join("shortcuts-per-app-logs"))
}

pub fn log_path() -> PathBuf {
    log_dir().join(LOG_FILE_NAME)
}

/// Category-tagged info line.
///
/// Prefer tracing macros directly when there are structured fields to attach.
pub fn log(category: &str, message: &str) {
    tracing::info!(category = category, "{}", message);
}

/// Debug-only logging - compiled out in release builds
#[cfg(debug_assertions)]
pub fn log_debug(category: &str, message: &str) {
    tracing::debug!(category = category, "{}", message);
}

#[cfg(not(debug_assertions))]
pub fn log_debug(_category: &str, _message: &str) {}

/// Log a registry change made by the engine
pub fn log_remap_event(action: &str, app: Option<&str>, entries: usize) {
    tracing::info!(
        event_type = "remap",
        action = action,
        app = app,
        entries = entries,
        "{} ({} entries{})",
        action,
        entries,
        app.map(|a| format!(", app {}", a)).unwrap_or_default()
    );
}

/// Log an error with structured fields and context
pub fn log_error(category: &str, error: &str, context: Option<&str>) {
    let msg = match context {
        Some(ctx) => format!("{}: {} (context: {})", category, error, ctx),
        None => format!("{}: {}", category, error),
    };

    tracing::error!(
        event_type = "error",
        category = category,
        error_message = error,
        context = context,
        "{}", msg
    );
}
