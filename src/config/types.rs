//! Configuration type definitions

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::defaults::*;

/// Where focus-change information comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusBackend {
    /// Poll the X server through the `xprop` binary
    #[default]
    Xprop,
    /// The host pushes `focusChanged` commands over stdin
    External,
}

/// Daemon configuration.
///
/// Every field has a default so a partial (or absent) file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Directory holding the three documents (default: the user config dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_dir: Option<String>,
    #[serde(default)]
    pub focus_backend: FocusBackend,
    #[serde(default = "default_focus_poll_interval_ms")]
    pub focus_poll_interval_ms: u64,
    #[serde(default = "default_gsettings_bin")]
    pub gsettings_bin: String,
    #[serde(default = "default_xprop_bin")]
    pub xprop_bin: String,
    #[serde(default = "default_reload_debounce_ms")]
    pub reload_debounce_ms: u64,
    #[serde(default = "default_watch_mapping")]
    pub watch_mapping: bool,
}

fn default_focus_poll_interval_ms() -> u64 {
    DEFAULT_FOCUS_POLL_INTERVAL_MS
}
fn default_gsettings_bin() -> String {
    DEFAULT_GSETTINGS_BIN.to_string()
}
fn default_xprop_bin() -> String {
    DEFAULT_XPROP_BIN.to_string()
}
fn default_reload_debounce_ms() -> u64 {
    DEFAULT_RELOAD_DEBOUNCE_MS
}
fn default_watch_mapping() -> bool {
    DEFAULT_WATCH_MAPPING
}

impl Default for Config {
    fn default() -> Self {
        Config {
            config_dir: None,
            focus_backend: FocusBackend::default(),
            focus_poll_interval_ms: DEFAULT_FOCUS_POLL_INTERVAL_MS,
            gsettings_bin: default_gsettings_bin(),
            xprop_bin: default_xprop_bin(),
            reload_debounce_ms: DEFAULT_RELOAD_DEBOUNCE_MS,
            watch_mapping: DEFAULT_WATCH_MAPPING,
        }
    }
}

impl Config {
    /// Resolve the directory holding the persisted documents.
    pub fn documents_dir(&self) -> PathBuf {
        match &self.config_dir {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).as_ref()),
            None => default_config_dir(),
        }
    }

    pub fn paths(&self) -> Paths {
        Paths::in_dir(&self.documents_dir())
    }
}

/// Locations of the three persisted documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// User mapping: app -> binding -> {name, command}
    pub mapping: PathBuf,
    /// Pristine system shortcut snapshot plus its fingerprint
    pub snapshot: PathBuf,
    /// Enabled/disabled state
    pub state: PathBuf,
}

impl Paths {
    pub fn in_dir(dir: &Path) -> Self {
        Paths {
            mapping: dir.join(MAPPING_FILE_NAME),
            snapshot: dir.join(SNAPSHOT_FILE_NAME),
            state: dir.join(STATE_FILE_NAME),
        }
    }
}

/// The user config dir (`$XDG_CONFIG_HOME`, usually `~/.config`)
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| {
        dirs::home_dir()
            .map(|h| h.join(".config"))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}
