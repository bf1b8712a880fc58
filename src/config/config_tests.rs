use super::*;
use std::path::Path;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.focus_backend, FocusBackend::Xprop);
    assert_eq!(config.focus_poll_interval_ms, DEFAULT_FOCUS_POLL_INTERVAL_MS);
    assert_eq!(config.gsettings_bin, "gsettings");
    assert_eq!(config.xprop_bin, "xprop");
    assert!(config.watch_mapping);
    assert_eq!(config.config_dir, None);
}

#[test]
fn test_partial_config_uses_defaults() {
    let config: Config = serde_json::from_str(r#"{"focusBackend": "external"}"#).unwrap();
    assert_eq!(config.focus_backend, FocusBackend::External);
    assert_eq!(config.reload_debounce_ms, DEFAULT_RELOAD_DEBOUNCE_MS);
    assert_eq!(config.gsettings_bin, DEFAULT_GSETTINGS_BIN);
}

#[test]
fn test_config_serialization_is_camel_case() {
    let config = Config {
        config_dir: Some("/tmp/spa".to_string()),
        focus_poll_interval_ms: 100,
        ..Default::default()
    };
    let json = serde_json::to_string(&config).unwrap();
    assert!(json.contains("\"configDir\""));
    assert!(json.contains("\"focusPollIntervalMs\":100"));

    let back: Config = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);
}

#[test]
fn test_paths_in_dir() {
    let paths = Paths::in_dir(Path::new("/tmp/spa"));
    assert_eq!(paths.mapping, Path::new("/tmp/spa/shortcuts-per-app.json"));
    assert_eq!(
        paths.snapshot,
        Path::new("/tmp/spa/shortcuts-per-app-system-cache.json")
    );
    assert_eq!(paths.state, Path::new("/tmp/spa/shortcuts-per-app-state.json"));
}

#[test]
fn test_config_dir_override() {
    let config = Config {
        config_dir: Some("/srv/spa".to_string()),
        ..Default::default()
    };
    assert_eq!(config.paths().state, Path::new("/srv/spa/shortcuts-per-app-state.json"));
}

#[test]
fn test_load_missing_config_returns_default() {
    let config = load_config_from(Path::new("/nonexistent/spa/daemon.json"));
    assert_eq!(config, Config::default());
}

#[test]
fn test_load_malformed_config_returns_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("daemon.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert_eq!(load_config_from(&path), Config::default());
}

#[test]
fn test_load_valid_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("daemon.json");
    std::fs::write(&path, r#"{"xpropBin": "/usr/bin/xprop", "watchMapping": false}"#).unwrap();
    let config = load_config_from(&path);
    assert_eq!(config.xprop_bin, "/usr/bin/xprop");
    assert!(!config.watch_mapping);
}

#[test]
fn test_owned_marker_is_not_in_default_gnome_paths() {
    // GNOME Settings names its own entries custom0, custom1, ...
    let gnome_path = format!("{}custom0/", CUSTOM_KEYBINDINGS_PATH);
    assert!(!gnome_path.contains(OWNED_MARKER));
}
