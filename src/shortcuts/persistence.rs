//! Durable documents: user mapping, system snapshot and engine state.
//!
//! Every document is JSON with a `version` field. Reads never fail: an absent
//! or malformed document yields the empty/default value. Writes go to a
//! temporary sibling first and are renamed into place, so a crash mid-write
//! leaves the previous document intact.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use super::types::{AppShortcut, AppShortcutMap, EngineState, ShortcutBinding, SystemSnapshot};
use crate::config::{Paths, DOCUMENT_VERSION};
use crate::error::RemapError;
use crate::fingerprint::Fingerprint;

/// On-disk form of the system snapshot
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotDocument {
    #[serde(default)]
    shortcuts: BTreeMap<String, ShortcutBinding>,
    #[serde(default)]
    hash: Option<Fingerprint>,
    #[serde(default)]
    timestamp: i64,
    #[serde(default = "default_version")]
    version: u32,
}

/// On-disk form of the engine state
#[derive(Debug, Serialize, Deserialize)]
struct StateDocument {
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    timestamp: i64,
    #[serde(default = "default_version")]
    version: u32,
}

fn default_version() -> u32 {
    DOCUMENT_VERSION
}

fn default_enabled() -> bool {
    true
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Loads and saves the three documents at fixed paths.
#[derive(Debug, Clone)]
pub struct Persistence {
    paths: Paths,
}

impl Persistence {
    pub fn new(paths: Paths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    /// Load the user mapping. Absent or malformed documents give an empty map.
    ///
    /// A malformed document is copied aside (`.json.corrupt`) before the empty
    /// map is returned, since the next save would otherwise overwrite it.
    #[instrument(name = "load_mapping", skip(self))]
    pub fn load_map(&self) -> AppShortcutMap {
        let path = &self.paths.mapping;
        match read_document(path) {
            Ok(None) => AppShortcutMap::new(),
            Ok(Some(value)) => match parse_mapping(&value) {
                Ok(map) => {
                    info!(path = %path.display(), shortcuts = map.len(), "Loaded shortcut mapping");
                    map
                }
                Err(reason) => {
                    quarantine(path);
                    warn_corrupt(path, reason);
                    AppShortcutMap::new()
                }
            },
            Err(err) => {
                if matches!(err, RemapError::ConfigCorrupt { .. }) {
                    quarantine(path);
                }
                warn!(error = %err, "Failed to load shortcut mapping, starting empty");
                AppShortcutMap::new()
            }
        }
    }

    /// Save the user mapping. Failures are returned so the user can be told.
    #[instrument(name = "save_mapping", skip(self, map))]
    pub fn save_map(&self, map: &AppShortcutMap) -> Result<(), RemapError> {
        write_json_atomic(&self.paths.mapping, &mapping_document(map))?;
        info!(path = %self.paths.mapping.display(), shortcuts = map.len(), "Saved shortcut mapping");
        Ok(())
    }

    /// Load the system snapshot and its stored fingerprint.
    #[instrument(name = "load_snapshot", skip(self))]
    pub fn load_snapshot(&self) -> SystemSnapshot {
        let path = &self.paths.snapshot;
        let value = match read_document(path) {
            Ok(Some(value)) => value,
            Ok(None) => return SystemSnapshot::default(),
            Err(err) => {
                warn!(error = %err, "Failed to load system snapshot");
                return SystemSnapshot::default();
            }
        };

        match serde_json::from_value::<SnapshotDocument>(value) {
            Ok(doc) => {
                debug!(entries = doc.shortcuts.len(), version = doc.version, "Loaded system snapshot");
                SystemSnapshot {
                    shortcuts: doc.shortcuts,
                    hash: doc.hash,
                }
            }
            Err(e) => {
                warn_corrupt(path, e.to_string());
                SystemSnapshot::default()
            }
        }
    }

    #[instrument(name = "save_snapshot", skip(self, snapshot))]
    pub fn save_snapshot(&self, snapshot: &SystemSnapshot) -> Result<(), RemapError> {
        let doc = SnapshotDocument {
            shortcuts: snapshot.shortcuts.clone(),
            hash: snapshot.hash.clone(),
            timestamp: now_millis(),
            version: DOCUMENT_VERSION,
        };
        write_json_atomic(&self.paths.snapshot, &doc)?;
        debug!(entries = snapshot.shortcuts.len(), "Saved system snapshot");
        Ok(())
    }

    /// Load the engine state; anything unreadable means enabled.
    #[instrument(name = "load_state", skip(self))]
    pub fn load_state(&self) -> EngineState {
        let path = &self.paths.state;
        let value = match read_document(path) {
            Ok(Some(value)) => value,
            Ok(None) => return EngineState::default(),
            Err(err) => {
                warn!(error = %err, "Failed to load engine state, assuming enabled");
                return EngineState::default();
            }
        };

        match serde_json::from_value::<StateDocument>(value) {
            Ok(doc) => EngineState {
                enabled: doc.enabled,
            },
            Err(e) => {
                warn_corrupt(path, e.to_string());
                EngineState::default()
            }
        }
    }

    #[instrument(name = "save_state", skip(self))]
    pub fn save_state(&self, state: &EngineState) -> Result<(), RemapError> {
        let doc = StateDocument {
            enabled: state.enabled,
            timestamp: now_millis(),
            version: DOCUMENT_VERSION,
        };
        write_json_atomic(&self.paths.state, &doc)
    }
}

/// Read and parse a JSON document. `Ok(None)` when the file does not exist.
fn read_document(path: &Path) -> Result<Option<Value>, RemapError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|e| RemapError::ConfigCorrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| RemapError::ConfigCorrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

fn warn_corrupt(path: &Path, reason: String) {
    let err = RemapError::ConfigCorrupt {
        path: path.to_path_buf(),
        reason,
    };
    warn!(error = %err, "Ignoring corrupt document");
}

fn quarantine(path: &Path) {
    let aside = path.with_extension("json.corrupt");
    if let Err(e) = fs::copy(path, &aside) {
        warn!(path = %path.display(), error = %e, "Failed to keep a copy of corrupt document");
    }
}

/// Normalize the mapping document into `AppShortcutMap`.
///
/// Shortcut values are either `{name, command}` or, in the legacy format, a
/// bare command string which gets the name `"<app> <binding>"`. A numeric
/// top-level `version` is document metadata, not an app.
fn parse_mapping(value: &Value) -> Result<AppShortcutMap, String> {
    let apps = value
        .as_object()
        .ok_or_else(|| "mapping document is not an object".to_string())?;

    let mut map = AppShortcutMap::new();
    for (app, shortcuts) in apps {
        if app == "version" && shortcuts.is_number() {
            continue;
        }
        let shortcuts = shortcuts
            .as_object()
            .ok_or_else(|| format!("shortcuts of '{}' are not an object", app))?;

        for (binding, shortcut) in shortcuts {
            let shortcut = match shortcut {
                Value::String(command) => {
                    debug!(app = %app, binding = %binding, "Migrating legacy shortcut value");
                    AppShortcut::new(format!("{} {}", app, binding), command.clone())
                }
                Value::Object(_) => serde_json::from_value::<AppShortcut>(shortcut.clone())
                    .map_err(|e| format!("shortcut '{}' of '{}': {}", binding, app, e))?,
                _ => {
                    return Err(format!(
                        "shortcut '{}' of '{}' is neither an object nor a string",
                        binding, app
                    ))
                }
            };
            map.insert(app.to_lowercase(), binding.clone(), shortcut);
        }
    }
    Ok(map)
}

fn mapping_document(map: &AppShortcutMap) -> Value {
    let mut doc = Map::new();
    doc.insert("version".to_string(), Value::from(DOCUMENT_VERSION));
    for (app, shortcuts) in map.iter() {
        let shortcuts: Map<String, Value> = shortcuts
            .iter()
            .map(|(binding, shortcut)| {
                let mut entry = Map::new();
                entry.insert("name".to_string(), Value::from(shortcut.name.clone()));
                entry.insert("command".to_string(), Value::from(shortcut.command.clone()));
                (binding.clone(), Value::Object(entry))
            })
            .collect();
        doc.insert(app.clone(), Value::Object(shortcuts));
    }
    Value::Object(doc)
}

/// Atomic write: ensure the parent exists, write a temp file, rename it over.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), RemapError> {
    let write_failed = |source: std::io::Error| RemapError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_failed)?;
    }

    let json = serde_json::to_string_pretty(value)
        .map_err(|e| write_failed(std::io::Error::other(e)))?;

    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, json).map_err(write_failed)?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(write_failed(e));
    }
    Ok(())
}

#[cfg(test)]
#[path = "persistence_tests.rs"]
mod tests;
