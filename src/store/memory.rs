//! In-process keybinding store.
//!
//! Backs `--dry-run` and the engine tests. Clones share the same registry, so
//! a test can keep a handle and play the part of "another program" editing
//! shortcuts while the engine owns its own clone.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{is_owned, KeybindingStore, StoreError};
use crate::shortcuts::ShortcutBinding;

#[derive(Debug, Default)]
struct Registry {
    active: Vec<String>,
    entries: HashMap<String, ShortcutBinding>,
    failing: HashSet<String>,
    failing_bindings: HashSet<String>,
    unavailable: bool,
    failing_commits: bool,
    commits: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    registry: Arc<Mutex<Registry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose active list holds `entries` in the given order.
    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, ShortcutBinding)>,
        K: Into<String>,
    {
        let store = Self::new();
        for (id, binding) in entries {
            store.insert_entry(id, binding);
        }
        store
    }

    /// Add or replace an entry and make sure it is active.
    pub fn insert_entry(&self, id: impl Into<String>, binding: ShortcutBinding) {
        let id = id.into();
        let mut registry = self.registry.lock();
        if !registry.active.contains(&id) {
            registry.active.push(id.clone());
        }
        registry.entries.insert(id, binding);
    }

    /// Drop an entry from the active list (its record stays, like dconf).
    pub fn deactivate(&self, id: &str) {
        self.registry.lock().active.retain(|active| active != id);
    }

    /// Make every read and write of `id` fail.
    pub fn fail_entry(&self, id: &str) {
        self.registry.lock().failing.insert(id.to_string());
    }

    /// Make every write of an entry bound to `accelerator` fail.
    pub fn fail_binding(&self, accelerator: &str) {
        self.registry.lock().failing_bindings.insert(accelerator.to_string());
    }

    /// Make `set_enumerated_ids` fail while everything else keeps working.
    pub fn fail_commits(&self, failing: bool) {
        self.registry.lock().failing_commits = failing;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.registry.lock().unavailable = unavailable;
    }

    pub fn active_ids(&self) -> Vec<String> {
        self.registry.lock().active.clone()
    }

    pub fn entry(&self, id: &str) -> Option<ShortcutBinding> {
        self.registry.lock().entries.get(id).cloned()
    }

    /// Active entries we do not own, as the desktop would see them.
    pub fn system_view(&self) -> BTreeMap<String, ShortcutBinding> {
        let registry = self.registry.lock();
        registry
            .active
            .iter()
            .filter(|id| !is_owned(id))
            .filter_map(|id| registry.entries.get(id).map(|b| (id.clone(), b.clone())))
            .collect()
    }

    /// Active entries we own.
    pub fn owned_view(&self) -> Vec<ShortcutBinding> {
        let registry = self.registry.lock();
        registry
            .active
            .iter()
            .filter(|id| is_owned(id))
            .filter_map(|id| registry.entries.get(id).cloned())
            .collect()
    }

    /// Stored records with a tagged id, active or not.
    pub fn owned_record_count(&self) -> usize {
        self.registry.lock().entries.keys().filter(|id| is_owned(id)).count()
    }

    /// Number of successful `set_enumerated_ids` calls.
    pub fn commits(&self) -> usize {
        self.registry.lock().commits
    }
}

impl KeybindingStore for MemoryStore {
    fn list(&self) -> Result<Vec<String>, StoreError> {
        let registry = self.registry.lock();
        if registry.unavailable {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(registry.active.clone())
    }

    fn read(&self, id: &str) -> Result<ShortcutBinding, StoreError> {
        let registry = self.registry.lock();
        if registry.unavailable || registry.failing.contains(id) {
            return Err(StoreError::Unavailable(format!("cannot read {}", id)));
        }
        registry
            .entries
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn write(&mut self, id: &str, binding: &ShortcutBinding) -> Result<(), StoreError> {
        let mut registry = self.registry.lock();
        if registry.unavailable
            || registry.failing.contains(id)
            || registry.failing_bindings.contains(&binding.binding)
        {
            return Err(StoreError::Unavailable(format!("cannot write {}", id)));
        }
        registry.entries.insert(id.to_string(), binding.clone());
        Ok(())
    }

    fn set_enumerated_ids(&mut self, ids: &[String]) -> Result<(), StoreError> {
        let mut registry = self.registry.lock();
        if registry.unavailable {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        if registry.failing_commits {
            return Err(StoreError::Unavailable("cannot write entry list".to_string()));
        }
        registry.active = ids.to_vec();
        registry.commits += 1;
        Ok(())
    }

    fn reset(&mut self, id: &str) -> Result<(), StoreError> {
        let mut registry = self.registry.lock();
        if registry.unavailable || registry.failing.contains(id) {
            return Err(StoreError::Unavailable(format!("cannot reset {}", id)));
        }
        registry.entries.remove(id);
        Ok(())
    }
}
