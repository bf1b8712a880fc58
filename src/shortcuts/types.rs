//! Core shortcut types.
//!
//! This module provides:
//! - `ShortcutBinding` - a complete registry entry value (name, accelerator, command)
//! - `AppShortcut` - a per-app shortcut whose accelerator is its map key
//! - `AppShortcutMap` - app id -> accelerator -> shortcut, the user's mapping
//! - `SystemSnapshot` / `EngineState` - the other two persisted documents

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::RemapError;
use crate::fingerprint::Fingerprint;

/// A custom keybinding as the registry stores it.
///
/// `binding` is an accelerator string such as `<Control>f`; `command` is a
/// shell command line.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShortcutBinding {
    pub name: String,
    pub binding: String,
    pub command: String,
}

impl ShortcutBinding {
    pub fn new(
        name: impl Into<String>,
        binding: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            binding: binding.into(),
            command: command.into(),
        }
    }

    /// Entries missing any field are not real shortcuts and are never snapshotted.
    pub fn is_complete(&self) -> bool {
        !self.name.is_empty() && !self.binding.is_empty() && !self.command.is_empty()
    }
}

/// One shortcut of an application. The accelerator is the key it is stored under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppShortcut {
    pub name: String,
    pub command: String,
}

impl AppShortcut {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }

    /// Build the registry value for this shortcut under `binding`.
    pub fn to_binding(&self, binding: &str, name_prefix: &str) -> ShortcutBinding {
        ShortcutBinding::new(
            format!("{}{}", name_prefix, self.name),
            binding,
            self.command.clone(),
        )
    }
}

/// Flattened view of one mapping entry, for listings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ShortcutRow {
    pub app: String,
    pub binding: String,
    pub name: String,
    pub command: String,
}

/// Application identifiers are matched case-insensitively.
pub fn normalize_app_id(app: &str) -> String {
    app.trim().to_lowercase()
}

/// The user's shortcut mapping: app id -> accelerator -> shortcut.
///
/// Keying by accelerator makes a second shortcut with the same binding for
/// the same app impossible. An app never maps to an empty set: removing its
/// last shortcut removes the app.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppShortcutMap {
    apps: BTreeMap<String, BTreeMap<String, AppShortcut>>,
}

impl AppShortcutMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, app: &str) -> Option<&BTreeMap<String, AppShortcut>> {
        self.apps.get(app)
    }

    pub fn has_app(&self, app: &str) -> bool {
        self.apps.contains_key(app)
    }

    pub fn shortcut(&self, app: &str, binding: &str) -> Option<&AppShortcut> {
        self.apps.get(app).and_then(|shortcuts| shortcuts.get(binding))
    }

    pub fn apps(&self) -> impl Iterator<Item = &String> {
        self.apps.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeMap<String, AppShortcut>)> {
        self.apps.iter()
    }

    /// Insert or replace the shortcut for `binding`. The app id is used as given.
    pub fn insert(
        &mut self,
        app: impl Into<String>,
        binding: impl Into<String>,
        shortcut: AppShortcut,
    ) -> Option<AppShortcut> {
        self.apps
            .entry(app.into())
            .or_default()
            .insert(binding.into(), shortcut)
    }

    /// Remove one shortcut, dropping the app once it has none left.
    pub fn remove(&mut self, app: &str, binding: &str) -> Option<AppShortcut> {
        let shortcuts = self.apps.get_mut(app)?;
        let removed = shortcuts.remove(binding);
        if shortcuts.is_empty() {
            self.apps.remove(app);
        }
        removed
    }

    /// Number of shortcuts across all apps.
    pub fn len(&self) -> usize {
        self.apps.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    pub fn rows(&self) -> Vec<ShortcutRow> {
        self.apps
            .iter()
            .flat_map(|(app, shortcuts)| {
                shortcuts.iter().map(move |(binding, shortcut)| ShortcutRow {
                    app: app.clone(),
                    binding: binding.clone(),
                    name: shortcut.name.clone(),
                    command: shortcut.command.clone(),
                })
            })
            .collect()
    }

    /// Validate and add a shortcut the way the settings form does.
    ///
    /// All fields are trimmed and required; the app id is lowercased. An
    /// existing shortcut with the same binding for that app is replaced.
    pub fn add_shortcut(
        &mut self,
        app: &str,
        binding: &str,
        name: &str,
        command: &str,
    ) -> Result<(), RemapError> {
        let (app, binding, shortcut) = validate_fields(app, binding, name, command)?;
        self.insert(app, binding, shortcut);
        Ok(())
    }

    /// Replace the shortcut at (`original_app`, `original_binding`) with a new one.
    ///
    /// The new entry may move to another app or binding.
    pub fn edit_shortcut(
        &mut self,
        original_app: &str,
        original_binding: &str,
        app: &str,
        binding: &str,
        name: &str,
        command: &str,
    ) -> Result<(), RemapError> {
        let (app, binding, shortcut) = validate_fields(app, binding, name, command)?;
        let original_app = normalize_app_id(original_app);
        let original_binding = original_binding.trim();
        if self.remove(&original_app, original_binding).is_none() {
            return Err(RemapError::NotFound {
                app: original_app,
                binding: original_binding.to_string(),
            });
        }
        self.insert(app, binding, shortcut);
        Ok(())
    }

    /// Delete a shortcut. Deleting an app's last shortcut removes the app.
    pub fn delete_shortcut(&mut self, app: &str, binding: &str) -> Result<AppShortcut, RemapError> {
        let app = normalize_app_id(app);
        let binding = binding.trim();
        self.remove(&app, binding).ok_or_else(|| RemapError::NotFound {
            app,
            binding: binding.to_string(),
        })
    }
}

fn validate_fields(
    app: &str,
    binding: &str,
    name: &str,
    command: &str,
) -> Result<(String, String, AppShortcut), RemapError> {
    let app = normalize_app_id(app);
    let binding = binding.trim();
    let name = name.trim();
    let command = command.trim();

    if app.is_empty() || binding.is_empty() || name.is_empty() || command.is_empty() {
        return Err(RemapError::InvalidShortcut(
            "All fields are required".to_string(),
        ));
    }

    Ok((app, binding.to_string(), AppShortcut::new(name, command)))
}

/// Last known-good state of every entry we did not create.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SystemSnapshot {
    pub shortcuts: BTreeMap<String, ShortcutBinding>,
    pub hash: Option<Fingerprint>,
}

/// Persisted engine state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineState {
    pub enabled: bool,
}

impl Default for EngineState {
    fn default() -> Self {
        Self { enabled: true }
    }
}
