//! GNOME custom keybindings through the `gsettings` command line tool.

use std::process::Command;

use tracing::debug;

use super::gvariant::{format_string_array, parse_string, parse_string_array, quote_string};
use super::{KeybindingStore, StoreError};
use crate::config::{CUSTOM_KEYBINDINGS_KEY, CUSTOM_KEYBINDING_SCHEMA, MEDIA_KEYS_SCHEMA};
use crate::shortcuts::ShortcutBinding;

/// The media-keys schema and its relocatable custom-keybinding schema.
#[derive(Debug, Clone)]
pub struct GSettingsStore {
    bin: String,
}

impl GSettingsStore {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    fn run(&self, args: &[&str]) -> Result<String, StoreError> {
        debug!(bin = %self.bin, ?args, "Running gsettings");
        let output = Command::new(&self.bin)
            .args(args)
            .output()
            .map_err(|e| StoreError::Unavailable(format!("failed to run {}: {}", self.bin, e)))?;

        if !output.status.success() {
            return Err(StoreError::Unavailable(format!(
                "{} {} failed: {}",
                self.bin,
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn get_field(&self, id: &str, key: &str) -> Result<String, StoreError> {
        let schema = relocatable_schema(id);
        let out = self.run(&["get", &schema, key])?;
        parse_string(&out).map_err(StoreError::Unavailable)
    }

    fn set_field(&self, id: &str, key: &str, value: &str) -> Result<(), StoreError> {
        let schema = relocatable_schema(id);
        self.run(&["set", &schema, key, &quote_string(value)])
            .map(|_| ())
    }
}

impl Default for GSettingsStore {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_GSETTINGS_BIN)
    }
}

/// `schema:path` addressing of a relocatable schema instance
fn relocatable_schema(id: &str) -> String {
    format!("{}:{}", CUSTOM_KEYBINDING_SCHEMA, id)
}

impl KeybindingStore for GSettingsStore {
    fn list(&self) -> Result<Vec<String>, StoreError> {
        let out = self.run(&["get", MEDIA_KEYS_SCHEMA, CUSTOM_KEYBINDINGS_KEY])?;
        parse_string_array(&out).map_err(StoreError::Unavailable)
    }

    fn read(&self, id: &str) -> Result<ShortcutBinding, StoreError> {
        let binding = ShortcutBinding {
            name: self.get_field(id, "name")?,
            binding: self.get_field(id, "binding")?,
            command: self.get_field(id, "command")?,
        };
        // dconf answers unknown paths with schema defaults (empty strings)
        if binding.name.is_empty() && binding.binding.is_empty() && binding.command.is_empty() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(binding)
    }

    fn write(&mut self, id: &str, binding: &ShortcutBinding) -> Result<(), StoreError> {
        self.set_field(id, "name", &binding.name)?;
        self.set_field(id, "binding", &binding.binding)?;
        self.set_field(id, "command", &binding.command)
    }

    fn set_enumerated_ids(&mut self, ids: &[String]) -> Result<(), StoreError> {
        self.run(&[
            "set",
            MEDIA_KEYS_SCHEMA,
            CUSTOM_KEYBINDINGS_KEY,
            &format_string_array(ids),
        ])
        .map(|_| ())
    }

    fn reset(&mut self, id: &str) -> Result<(), StoreError> {
        self.run(&["reset-recursively", &relocatable_schema(id)])
            .map(|_| ())
    }
}
