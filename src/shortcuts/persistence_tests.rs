use super::*;
use crate::fingerprint::fingerprint;
use tempfile::{tempdir, TempDir};

fn persistence() -> (Persistence, TempDir) {
    let dir = tempdir().unwrap();
    let persistence = Persistence::new(Paths::in_dir(dir.path()));
    (persistence, dir)
}

#[test]
fn missing_documents_give_defaults() {
    let (persistence, _dir) = persistence();

    assert!(persistence.load_map().is_empty());
    assert_eq!(persistence.load_snapshot(), SystemSnapshot::default());
    assert!(persistence.load_state().enabled);
}

#[test]
fn corrupt_mapping_loads_empty_and_is_kept_aside() {
    let (persistence, _dir) = persistence();
    let path = persistence.paths().mapping.clone();
    fs::write(&path, "{ \"firefox\": { oops").unwrap();

    assert!(persistence.load_map().is_empty());
    let aside = path.with_extension("json.corrupt");
    assert_eq!(fs::read_to_string(aside).unwrap(), "{ \"firefox\": { oops");
}

#[test]
fn mapping_with_wrong_shape_loads_empty() {
    let (persistence, _dir) = persistence();
    fs::write(&persistence.paths().mapping, r#"{"firefox": 42}"#).unwrap();

    assert!(persistence.load_map().is_empty());
}

#[test]
fn mapping_roundtrip_keeps_every_shortcut() {
    let (persistence, _dir) = persistence();
    let mut map = AppShortcutMap::new();
    map.add_shortcut("firefox", "<Control>f", "Find", "echo find").unwrap();
    map.add_shortcut("code", "<Alt>t", "Term", "gnome-terminal").unwrap();

    persistence.save_map(&map).unwrap();
    assert_eq!(persistence.load_map(), map);
}

#[test]
fn mapping_document_has_documented_shape() {
    let (persistence, _dir) = persistence();
    let mut map = AppShortcutMap::new();
    map.add_shortcut("firefox", "<Control>f", "Find", "echo find").unwrap();
    persistence.save_map(&map).unwrap();

    let raw: Value =
        serde_json::from_str(&fs::read_to_string(&persistence.paths().mapping).unwrap()).unwrap();
    assert_eq!(raw["version"], 1);
    assert_eq!(raw["firefox"]["<Control>f"]["name"], "Find");
    assert_eq!(raw["firefox"]["<Control>f"]["command"], "echo find");
}

#[test]
fn legacy_string_values_are_migrated() {
    let (persistence, _dir) = persistence();
    fs::write(
        &persistence.paths().mapping,
        r#"{"Firefox": {"<Control>f": "echo find"}}"#,
    )
    .unwrap();

    let map = persistence.load_map();
    let shortcut = map.shortcut("firefox", "<Control>f").unwrap();
    assert_eq!(shortcut.command, "echo find");
    assert_eq!(shortcut.name, "Firefox <Control>f");
}

#[test]
fn snapshot_roundtrip_keeps_hash() {
    let (persistence, _dir) = persistence();
    let mut shortcuts = BTreeMap::new();
    shortcuts.insert(
        "/custom0/".to_string(),
        ShortcutBinding::new("Terminal", "<Super>t", "gnome-terminal"),
    );
    let snapshot = SystemSnapshot {
        hash: Some(fingerprint(&shortcuts)),
        shortcuts,
    };

    persistence.save_snapshot(&snapshot).unwrap();
    assert_eq!(persistence.load_snapshot(), snapshot);

    let raw: Value =
        serde_json::from_str(&fs::read_to_string(&persistence.paths().snapshot).unwrap()).unwrap();
    assert_eq!(raw["version"], 1);
    assert!(raw["timestamp"].as_i64().unwrap() > 0);
    assert_eq!(raw["shortcuts"]["/custom0/"]["binding"], "<Super>t");
}

#[test]
fn snapshot_from_older_writer_loads() {
    let (persistence, _dir) = persistence();
    fs::write(
        &persistence.paths().snapshot,
        r#"{"shortcuts": {"/c0/": {"name": "a", "binding": "b", "command": "c"}}, "hash": "-1234"}"#,
    )
    .unwrap();

    let snapshot = persistence.load_snapshot();
    assert_eq!(snapshot.shortcuts.len(), 1);
    assert_eq!(snapshot.hash.unwrap().as_str(), "-1234");
}

#[test]
fn state_roundtrip() {
    let (persistence, _dir) = persistence();
    persistence.save_state(&EngineState { enabled: false }).unwrap();
    assert!(!persistence.load_state().enabled);

    persistence.save_state(&EngineState { enabled: true }).unwrap();
    assert!(persistence.load_state().enabled);
}

#[test]
fn unreadable_state_means_enabled() {
    let (persistence, _dir) = persistence();
    fs::write(&persistence.paths().state, "not json").unwrap();
    assert!(persistence.load_state().enabled);

    fs::write(&persistence.paths().state, r#"{"timestamp": 1}"#).unwrap();
    assert!(persistence.load_state().enabled);
}

#[test]
fn save_creates_parent_directories_and_leaves_no_temp_file() {
    let dir = tempdir().unwrap();
    let nested = dir.path().join("a").join("b");
    let persistence = Persistence::new(Paths::in_dir(&nested));

    persistence.save_state(&EngineState { enabled: false }).unwrap();

    assert!(persistence.paths().state.exists());
    assert!(!persistence.paths().state.with_extension("json.tmp").exists());
}

#[test]
fn failed_save_keeps_previous_document() {
    let (persistence, dir) = persistence();
    let mut map = AppShortcutMap::new();
    map.add_shortcut("firefox", "<Control>f", "Find", "echo find").unwrap();
    persistence.save_map(&map).unwrap();

    // A directory squatting on the temp path makes the write fail
    fs::create_dir(dir.path().join("shortcuts-per-app.json.tmp")).unwrap();
    let mut changed = map.clone();
    changed.add_shortcut("code", "<Alt>t", "Term", "x").unwrap();

    let err = persistence.save_map(&changed).unwrap_err();
    assert!(matches!(err, RemapError::WriteFailed { .. }));
    assert_eq!(persistence.load_map(), map);
}
