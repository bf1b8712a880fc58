//! Configuration loading from file system
//!
//! A missing or malformed file never stops the daemon; it falls back to
//! `Config::default()` and says why in the log.

use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use super::defaults::DAEMON_CONFIG_FILE_NAME;
use super::types::{default_config_dir, Config};

/// Default location of the daemon configuration file
pub fn default_config_path() -> PathBuf {
    default_config_dir().join(DAEMON_CONFIG_FILE_NAME)
}

/// Load configuration from the default location.
pub fn load_config() -> Config {
    load_config_from(&default_config_path())
}

/// Load configuration from `path`.
///
/// Returns Config::default() if the file is absent, unreadable or invalid.
#[instrument(name = "load_config")]
pub fn load_config_from(path: &Path) -> Config {
    if !path.exists() {
        info!(path = %path.display(), "Config file not found, using defaults");
        return Config::default();
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read config, using defaults");
            return Config::default();
        }
    };

    match serde_json::from_str::<Config>(&content) {
        Ok(config) => {
            info!(path = %path.display(), "Successfully loaded config");
            config
        }
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Failed to parse config JSON, using defaults"
            );
            Config::default()
        }
    }
}
