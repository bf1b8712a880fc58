//! Typed access to the desktop's custom keybinding registry.
//!
//! The registry is a list of active entry identifiers plus, per identifier, a
//! `{name, binding, command}` record. Entries whose identifier contains
//! `OWNED_MARKER` were created by the engine; every other entry belongs to the
//! user or the system and is only ever read or restored, never deleted.

mod gsettings;
mod gvariant;
mod memory;

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::warn;

use crate::config::OWNED_MARKER;
use crate::error::RemapError;
use crate::shortcuts::ShortcutBinding;

pub use gsettings::GSettingsStore;
pub use gvariant::{format_string_array, parse_string, parse_string_array, quote_string};
pub use memory::MemoryStore;

/// Errors reported by a keybinding store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("no keybinding at {0}")]
    NotFound(String),
    #[error("{0}")]
    Unavailable(String),
}

impl From<StoreError> for RemapError {
    fn from(err: StoreError) -> Self {
        RemapError::StoreUnavailable(err.to_string())
    }
}

/// Synchronous access to the keybinding registry.
///
/// Any call may fail with `StoreError::Unavailable`; callers log and carry on
/// with the remaining entries.
pub trait KeybindingStore {
    /// Active entry identifiers, in registry order.
    fn list(&self) -> Result<Vec<String>, StoreError>;

    fn read(&self, id: &str) -> Result<ShortcutBinding, StoreError>;

    fn write(&mut self, id: &str, binding: &ShortcutBinding) -> Result<(), StoreError>;

    /// Replace the active entry list in one write.
    fn set_enumerated_ids(&mut self, ids: &[String]) -> Result<(), StoreError>;

    /// Drop the stored record of an entry that is no longer active.
    fn reset(&mut self, id: &str) -> Result<(), StoreError>;
}

/// True for identifiers created by the engine.
pub fn is_owned(id: &str) -> bool {
    id.contains(OWNED_MARKER)
}

/// Read every complete entry we do not own.
///
/// Fails only when the active list itself cannot be read; an unreadable or
/// incomplete entry is logged and skipped.
pub fn read_system_entries<S: KeybindingStore + ?Sized>(
    store: &S,
) -> Result<BTreeMap<String, ShortcutBinding>, StoreError> {
    let mut entries = BTreeMap::new();
    for id in store.list()? {
        if is_owned(&id) {
            continue;
        }
        match store.read(&id) {
            Ok(binding) if binding.is_complete() => {
                entries.insert(id, binding);
            }
            Ok(_) => {}
            Err(e) => warn!(entry_id = %id, error = %e, "Failed to read keybinding"),
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_ids_are_recognised_by_marker() {
        assert!(is_owned(
            "/org/gnome/settings-daemon/plugins/media-keys/custom-keybindings/spa-firefox-1-0/"
        ));
        assert!(!is_owned(
            "/org/gnome/settings-daemon/plugins/media-keys/custom-keybindings/custom0/"
        ));
    }

    #[test]
    fn system_entries_skip_owned_and_incomplete() {
        let store = MemoryStore::with_entries([
            ("/c0/", ShortcutBinding::new("Terminal", "<Super>t", "gnome-terminal")),
            ("/c1/", ShortcutBinding::new("", "<Super>x", "x")),
            ("/spa-firefox-1-0/", ShortcutBinding::new("SPA: Find", "<Control>f", "f")),
        ]);

        let entries = read_system_entries(&store).unwrap();
        assert_eq!(entries.keys().collect::<Vec<_>>(), vec!["/c0/"]);
    }

    #[test]
    fn unreadable_entry_does_not_hide_the_rest() {
        let store = MemoryStore::with_entries([
            ("/c0/", ShortcutBinding::new("A", "<Super>a", "a")),
            ("/c1/", ShortcutBinding::new("B", "<Super>b", "b")),
        ]);
        store.fail_entry("/c0/");

        let entries = read_system_entries(&store).unwrap();
        assert_eq!(entries.keys().collect::<Vec<_>>(), vec!["/c1/"]);
    }

    #[test]
    fn unavailable_store_is_an_error() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(read_system_entries(&store).is_err());
    }
}
