use std::path::PathBuf;

use thiserror::Error;
use tracing::{error, warn};

/// How loudly a failure should be surfaced to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Warning, // recovered automatically
    Error,   // the requested operation did not happen
}

/// Domain errors of the remapping engine.
///
/// None of these terminate the process. Corrupt documents fall back to
/// defaults, store failures skip the affected entry, and only a failed save
/// of the user mapping is handed back to the caller.
#[derive(Error, Debug)]
pub enum RemapError {
    #[error("Corrupt document at {path}: {reason}")]
    ConfigCorrupt { path: PathBuf, reason: String },

    #[error("Keybinding store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid shortcut: {0}")]
    InvalidShortcut(String),

    #[error("No shortcut '{binding}' for app '{app}'")]
    NotFound { app: String, binding: String },
}

impl RemapError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::ConfigCorrupt { .. } => ErrorSeverity::Warning,
            Self::StoreUnavailable(_) => ErrorSeverity::Warning,
            Self::WriteFailed { .. } => ErrorSeverity::Error,
            Self::InvalidShortcut(_) => ErrorSeverity::Error,
            Self::NotFound { .. } => ErrorSeverity::Error,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::ConfigCorrupt { path, .. } => {
                format!("{} could not be read and was ignored", path.display())
            }
            Self::StoreUnavailable(msg) => format!("Keyboard settings are unavailable: {}", msg),
            Self::WriteFailed { path, .. } => format!("Could not save {}", path.display()),
            Self::InvalidShortcut(msg) => msg.clone(),
            Self::NotFound { app, binding } => {
                format!("There is no shortcut {} for {}", binding, app)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, RemapError>;

/// Extension trait for silent error logging with caller location tracking.
/// Use when the operation is recoverable and the user doesn't need to know.
///
/// ```ignore
/// use shortcuts_per_app::error::ResultExt;
///
/// // The snapshot heals itself on the next drift check
/// persistence.save_snapshot(&snapshot).log_err();
/// ```
pub trait ResultExt<T> {
    /// Log error with caller location and return None. Use for recoverable failures.
    fn log_err(self) -> Option<T>;
    /// Log as warning with caller location and return None. Use for expected failures.
    fn warn_on_err(self) -> Option<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    #[track_caller]
    fn log_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(err) => {
                let caller = std::panic::Location::caller();
                error!(
                    error = %err,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation failed"
                );
                None
            }
        }
    }

    #[track_caller]
    fn warn_on_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(err) => {
                let caller = std::panic::Location::caller();
                warn!(
                    error = %err,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation had warning"
                );
                None
            }
        }
    }
}
