//! Default configuration values
//!
//! All constants used throughout the config module are defined here.

/// File names of the three persisted documents, relative to the config dir
pub const MAPPING_FILE_NAME: &str = "shortcuts-per-app.json";
pub const SNAPSHOT_FILE_NAME: &str = "shortcuts-per-app-system-cache.json";
pub const STATE_FILE_NAME: &str = "shortcuts-per-app-state.json";

/// Daemon configuration file name, relative to the config dir
pub const DAEMON_CONFIG_FILE_NAME: &str = "shortcuts-per-app-daemon.json";

/// Schema version written into every persisted document
pub const DOCUMENT_VERSION: u32 = 1;

/// GSettings schema holding the list of active custom keybindings
pub const MEDIA_KEYS_SCHEMA: &str = "org.gnome.settings-daemon.plugins.media-keys";
/// Key of the active-entry list inside `MEDIA_KEYS_SCHEMA`
pub const CUSTOM_KEYBINDINGS_KEY: &str = "custom-keybindings";
/// Relocatable schema of a single custom keybinding
pub const CUSTOM_KEYBINDING_SCHEMA: &str =
    "org.gnome.settings-daemon.plugins.media-keys.custom-keybinding";
/// dconf directory under which custom keybindings live
pub const CUSTOM_KEYBINDINGS_PATH: &str =
    "/org/gnome/settings-daemon/plugins/media-keys/custom-keybindings/";

/// Substring that marks a registry entry as created by us.
/// Nothing else may create identifiers containing it.
pub const OWNED_MARKER: &str = "spa-";

/// Prefix put in front of the user-visible name of every entry we create
pub const NAME_PREFIX: &str = "SPA: ";

/// Default external binaries
pub const DEFAULT_GSETTINGS_BIN: &str = "gsettings";
pub const DEFAULT_XPROP_BIN: &str = "xprop";

/// Default focus polling interval for the xprop backend
pub const DEFAULT_FOCUS_POLL_INTERVAL_MS: u64 = 250;

/// Debounce window for reloading the mapping after it changed on disk
pub const DEFAULT_RELOAD_DEBOUNCE_MS: u64 = 200;

/// Watch the mapping document for edits made by other processes
pub const DEFAULT_WATCH_MAPPING: bool = true;
