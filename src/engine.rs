//! The remapping engine.
//!
//! Owns the keybinding store, the focus source and the three persisted
//! documents, and keeps the registry in one of two shapes: the user's own
//! entries exactly as last observed, or those entries plus the overlay of
//! tagged entries for the focused app.
//!
//! State machine:
//!
//! ```text
//!            set_enabled(false)
//!   Idle  ─────────────────────────▶ Disabled
//!    │ ▲                               │
//!    │ │ focus: unmapped app           │ set_enabled(true)
//!    ▼ │                               ▼
//!   Remapped(app)  ◀── focus: mapped app ── (re-evaluate focus)
//! ```
//!
//! Every change of the active entry list is computed in full and committed
//! with a single `set_enumerated_ids` call, so the registry never holds a
//! half-restored snapshot next to a half-applied overlay.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::{CUSTOM_KEYBINDINGS_PATH, NAME_PREFIX, OWNED_MARKER};
use crate::error::{RemapError, ResultExt};
use crate::fingerprint::fingerprint;
use crate::focus::FocusSource;
use crate::logging;
use crate::shortcuts::{
    normalize_app_id, AppShortcutMap, EngineState, Persistence, ShortcutBinding, ShortcutRow,
    SystemSnapshot,
};
use crate::store::{is_owned, read_system_entries, KeybindingStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemapState {
    Disabled,
    Idle,
    Remapped(String),
}

impl RemapState {
    pub fn label(&self) -> &'static str {
        match self {
            RemapState::Disabled => "disabled",
            RemapState::Idle => "idle",
            RemapState::Remapped(_) => "remapped",
        }
    }
}

/// Point-in-time summary for `status` requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub enabled: bool,
    pub state: &'static str,
    pub remapped_app: Option<String>,
    pub focused_app: Option<String>,
    pub app_count: usize,
    pub shortcut_count: usize,
    pub snapshot_entries: usize,
    pub snapshot_hash: Option<String>,
}

pub struct RemapEngine<S: KeybindingStore> {
    store: S,
    focus: Box<dyn FocusSource>,
    persistence: Persistence,
    shortcuts: AppShortcutMap,
    /// System entries as last read from the live registry.
    cached: BTreeMap<String, ShortcutBinding>,
    /// Persisted copy of the system entries with their fingerprint.
    snapshot: SystemSnapshot,
    enabled: bool,
    /// Lowercased class of the focused window at the last evaluation.
    focused_app: Option<String>,
    /// App whose overlay is currently committed.
    remapped_app: Option<String>,
    /// The last switch did not reach the registry; retry even if focus stays put.
    switch_pending: bool,
    id_counter: u64,
}

impl<S: KeybindingStore> RemapEngine<S> {
    /// Build an engine. Nothing is read or written until `start()`.
    pub fn new(store: S, focus: Box<dyn FocusSource>, persistence: Persistence) -> Self {
        Self {
            store,
            focus,
            persistence,
            shortcuts: AppShortcutMap::new(),
            cached: BTreeMap::new(),
            snapshot: SystemSnapshot::default(),
            enabled: true,
            focused_app: None,
            remapped_app: None,
            switch_pending: false,
            id_counter: 0,
        }
    }

    /// Load the persisted documents and reconcile them with the live registry.
    ///
    /// Tagged entries still active from an earlier run that did not shut down
    /// cleanly are removed. Focus is not evaluated here; callers follow up
    /// with `on_focus_changed()`.
    #[instrument(skip(self))]
    pub fn start(&mut self) -> RemapState {
        self.shortcuts = self.persistence.load_map();
        self.enabled = self.persistence.load_state().enabled;
        self.snapshot = self.persistence.load_snapshot();

        self.refresh_drift();

        let lingering = self
            .store
            .list()
            .map(|ids| ids.iter().filter(|id| is_owned(id)).count())
            .unwrap_or(0);
        if lingering > 0 {
            info!(entries = lingering, "Removing overlay left by a previous run");
            self.restore();
        }

        info!(
            enabled = self.enabled,
            apps = self.shortcuts.apps().count(),
            shortcuts = self.shortcuts.len(),
            snapshot_entries = self.snapshot.shortcuts.len(),
            "Engine started"
        );
        self.state()
    }

    pub fn state(&self) -> RemapState {
        if !self.enabled {
            return RemapState::Disabled;
        }
        match &self.remapped_app {
            Some(app) => RemapState::Remapped(app.clone()),
            None => RemapState::Idle,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable remapping. Unchanged values are a no-op.
    pub fn set_enabled(&mut self, enabled: bool) -> RemapState {
        if enabled == self.enabled {
            return self.state();
        }

        self.enabled = enabled;
        self.persistence
            .save_state(&EngineState { enabled })
            .log_err();
        logging::log(
            "ENGINE",
            if enabled { "Remapping enabled" } else { "Remapping disabled" },
        );

        // Either way the next evaluation starts from scratch
        self.focused_app = None;
        if enabled {
            self.on_focus_changed()
        } else {
            self.refresh_drift();
            self.restore();
            RemapState::Disabled
        }
    }

    pub fn toggle(&mut self) -> RemapState {
        self.set_enabled(!self.enabled)
    }

    /// React to a focus change notification.
    pub fn on_focus_changed(&mut self) -> RemapState {
        if !self.enabled {
            return RemapState::Disabled;
        }

        self.refresh_drift();

        let app = self
            .focus
            .focused_class()
            .map(|class| normalize_app_id(&class))
            .filter(|app| !app.is_empty());

        if app == self.focused_app && !self.switch_pending {
            debug!(app = ?app, "Focus unchanged");
            return self.state();
        }

        debug!(from = ?self.focused_app, to = ?app, "Focus changed");
        self.focused_app = app.clone();
        self.switch_to(app.as_deref());
        self.state()
    }

    /// Compare the live system entries against the snapshot and rebuild it on drift.
    ///
    /// Returns true when the snapshot was rebuilt. An unreadable registry
    /// leaves cache and snapshot untouched.
    pub fn refresh_drift(&mut self) -> bool {
        let live = match read_system_entries(&self.store) {
            Ok(live) => live,
            Err(e) => {
                warn!(error = %e, "Cannot read keybindings, keeping last snapshot");
                return false;
            }
        };

        let hash = fingerprint(&live);
        if self.snapshot.hash.as_ref() == Some(&hash) {
            self.cached = live;
            return false;
        }

        info!(
            previous = ?self.snapshot.hash.as_ref().map(|h| h.as_str().to_string()),
            current = %hash,
            entries = live.len(),
            "Keybindings changed outside the engine, rebuilding snapshot"
        );
        self.cached = live.clone();
        self.snapshot = SystemSnapshot {
            shortcuts: live,
            hash: Some(hash),
        };
        self.persistence.save_snapshot(&self.snapshot).log_err();
        true
    }

    /// Add the overlay for `app` to the active list.
    ///
    /// Apps without shortcuts leave the registry untouched. Returns the
    /// number of entries applied.
    pub fn apply(&mut self, app: &str) -> usize {
        let app = normalize_app_id(app);
        let current = match self.store.list() {
            Ok(ids) => ids,
            Err(e) => {
                warn!(app = %app, error = %e, "Cannot list keybindings, overlay skipped");
                return 0;
            }
        };

        let overlay = self.write_overlay(&app);
        if overlay.is_empty() {
            return 0;
        }

        let applied = overlay.len();
        let mut ids = current.clone();
        ids.extend(overlay);
        if self.commit(&current, &ids) {
            self.remapped_app = Some(app.clone());
            logging::log_remap_event("Overlay applied", Some(app.as_str()), applied);
            applied
        } else {
            0
        }
    }

    /// Remove every tagged entry and put back every known system entry.
    pub fn restore(&mut self) {
        let Some((current, ids)) = self.restored_ids() else {
            return;
        };
        let removed = current.iter().filter(|id| is_owned(id)).count();
        if self.commit(&current, &ids) {
            self.remapped_app = None;
            self.retire(&current, &ids);
            logging::log_remap_event("Restored", None, removed);
        }
        self.persistence.save_snapshot(&self.snapshot).log_err();
    }

    /// Restore, then overlay `app` if it has shortcuts, in one commit.
    fn switch_to(&mut self, app: Option<&str>) {
        let Some((current, mut ids)) = self.restored_ids() else {
            self.switch_pending = true;
            return;
        };

        let overlay = app.map(|app| self.write_overlay(app)).unwrap_or_default();
        let applied = overlay.len();
        ids.extend(overlay.iter().cloned());

        if self.commit(&current, &ids) {
            self.switch_pending = false;
            self.remapped_app = if applied > 0 {
                app.map(str::to_string)
            } else {
                None
            };
            self.retire(&current, &ids);
            logging::log_remap_event("Switched overlay", app, applied);
        } else {
            // Whatever was active before is still active
            self.switch_pending = true;
            self.retire(&overlay, &[]);
        }
        self.persistence.save_snapshot(&self.snapshot).log_err();
    }

    /// Re-evaluate the overlay for the focused app after its shortcuts changed.
    fn reapply(&mut self) {
        if !self.enabled {
            return;
        }
        self.refresh_drift();
        let app = self.focused_app.clone();
        self.switch_to(app.as_deref());
    }

    /// Active list with tagged entries removed and every known system entry present.
    ///
    /// Missing entries are written back first; one that cannot be written is
    /// left out of the list. Returns `(current, restored)`, or None if the
    /// active list cannot be read.
    fn restored_ids(&mut self) -> Option<(Vec<String>, Vec<String>)> {
        let current = match self.store.list() {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "Cannot list keybindings, restore skipped");
                return None;
            }
        };

        let mut ids: Vec<String> = current.iter().filter(|id| !is_owned(id)).cloned().collect();
        for (id, binding) in self.restore_set() {
            if ids.contains(&id) {
                continue;
            }
            match self.store.write(&id, &binding) {
                Ok(()) => {
                    debug!(entry_id = %id, "Re-added system keybinding");
                    ids.push(id);
                }
                Err(e) => warn!(entry_id = %id, error = %e, "Failed to restore keybinding"),
            }
        }
        Some((current, ids))
    }

    /// Snapshot entries overlaid with the fresher cached ones.
    fn restore_set(&self) -> BTreeMap<String, ShortcutBinding> {
        let mut set = self.snapshot.shortcuts.clone();
        set.extend(self.cached.iter().map(|(id, b)| (id.clone(), b.clone())));
        set
    }

    /// Write one tagged entry per shortcut of `app`. Returns the ids written.
    fn write_overlay(&mut self, app: &str) -> Vec<String> {
        let bindings: Vec<ShortcutBinding> = match self.shortcuts.get(app) {
            Some(shortcuts) => shortcuts
                .iter()
                .map(|(binding, shortcut)| shortcut.to_binding(binding, NAME_PREFIX))
                .collect(),
            None => return Vec::new(),
        };

        let mut ids = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let id = self.next_entry_id(app);
            match self.store.write(&id, &binding) {
                Ok(()) => ids.push(id),
                Err(e) => warn!(
                    app = %app,
                    binding = %binding.binding,
                    error = %e,
                    "Failed to add shortcut, skipping"
                ),
            }
        }
        ids
    }

    /// Reset the records of tagged entries in `previous` that `active` no longer lists.
    fn retire(&mut self, previous: &[String], active: &[String]) {
        for id in previous.iter().filter(|id| is_owned(id) && !active.contains(id)) {
            if let Err(e) = self.store.reset(id) {
                debug!(entry_id = %id, error = %e, "Failed to reset retired keybinding");
            }
        }
    }

    fn commit(&mut self, current: &[String], ids: &[String]) -> bool {
        if current == ids {
            return true;
        }
        match self.store.set_enumerated_ids(ids) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to commit keybinding list");
                false
            }
        }
    }

    /// Fresh tagged identifier: app slug, wall clock millis and a session counter.
    fn next_entry_id(&mut self, app: &str) -> String {
        self.id_counter += 1;
        let slug: String = app
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();
        format!(
            "{}{}{}-{}-{}/",
            CUSTOM_KEYBINDINGS_PATH,
            OWNED_MARKER,
            slug,
            chrono::Utc::now().timestamp_millis(),
            self.id_counter
        )
    }

    // ---------------------------------------------------------------------
    // User edits
    // ---------------------------------------------------------------------

    pub fn add_shortcut(
        &mut self,
        app: &str,
        binding: &str,
        name: &str,
        command: &str,
    ) -> Result<(), RemapError> {
        let mut updated = self.shortcuts.clone();
        updated.add_shortcut(app, binding, name, command)?;
        self.commit_map(updated, &[normalize_app_id(app)])
    }

    #[allow(clippy::too_many_arguments)]
    pub fn edit_shortcut(
        &mut self,
        original_app: &str,
        original_binding: &str,
        app: &str,
        binding: &str,
        name: &str,
        command: &str,
    ) -> Result<(), RemapError> {
        let mut updated = self.shortcuts.clone();
        updated.edit_shortcut(original_app, original_binding, app, binding, name, command)?;
        self.commit_map(
            updated,
            &[normalize_app_id(original_app), normalize_app_id(app)],
        )
    }

    pub fn delete_shortcut(&mut self, app: &str, binding: &str) -> Result<(), RemapError> {
        let mut updated = self.shortcuts.clone();
        updated.delete_shortcut(app, binding)?;
        self.commit_map(updated, &[normalize_app_id(app)])
    }

    /// Save `updated`, adopt it, and refresh the overlay if a touched app is in focus.
    fn commit_map(&mut self, updated: AppShortcutMap, touched: &[String]) -> Result<(), RemapError> {
        self.persistence.save_map(&updated)?;
        self.shortcuts = updated;

        let in_focus = touched.iter().any(|app| {
            self.focused_app.as_ref() == Some(app) || self.remapped_app.as_ref() == Some(app)
        });
        if in_focus {
            self.reapply();
        }
        Ok(())
    }

    /// Pick up a mapping document changed by someone else.
    ///
    /// Returns false when the document matches what is already loaded.
    pub fn reload_map(&mut self) -> bool {
        let loaded = self.persistence.load_map();
        if loaded == self.shortcuts {
            return false;
        }
        info!(shortcuts = loaded.len(), "Shortcut mapping reloaded");
        self.shortcuts = loaded;
        self.reapply();
        true
    }

    /// Follow an enabled flag written to the state document by someone else.
    pub fn reload_state(&mut self) -> RemapState {
        let enabled = self.persistence.load_state().enabled;
        self.set_enabled(enabled)
    }

    pub fn list_shortcuts(&self) -> Vec<ShortcutRow> {
        self.shortcuts.rows()
    }

    pub fn shortcuts(&self) -> &AppShortcutMap {
        &self.shortcuts
    }

    /// Class of the focused window, as reported.
    pub fn active_window(&self) -> Option<String> {
        self.focus.focused_class()
    }

    pub fn status(&self) -> EngineStatus {
        let state = self.state();
        EngineStatus {
            enabled: self.enabled,
            state: state.label(),
            remapped_app: match state {
                RemapState::Remapped(app) => Some(app),
                _ => None,
            },
            focused_app: self.focused_app.clone(),
            app_count: self.shortcuts.apps().count(),
            shortcut_count: self.shortcuts.len(),
            snapshot_entries: self.snapshot.shortcuts.len(),
            snapshot_hash: self.snapshot.hash.as_ref().map(|h| h.as_str().to_string()),
        }
    }

    /// Persist everything and hand the registry back in its original shape.
    #[instrument(skip(self))]
    pub fn shutdown(&mut self) {
        self.refresh_drift();
        self.persistence
            .save_state(&EngineState {
                enabled: self.enabled,
            })
            .log_err();
        self.persistence.save_snapshot(&self.snapshot).log_err();
        self.restore();
        self.focused_app = None;
        self.switch_pending = false;
        info!("Engine shut down");
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
