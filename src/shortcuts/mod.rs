//! Shortcut data and its durable storage.
//!
//! This module provides:
//! - The value types shared by the engine and the registry adapters
//! - The user's per-app mapping with its validated edit operations
//! - Atomic JSON persistence of the mapping, the system snapshot and the
//!   enabled state
//!
//! # Example
//!
//! ```ignore
//! use shortcuts_per_app::shortcuts::{AppShortcutMap, Persistence};
//!
//! let mut map = persistence.load_map();
//! map.add_shortcut("firefox", "<Control>f", "Find", "echo find")?;
//! persistence.save_map(&map)?;
//! ```

mod persistence;
mod types;

pub use persistence::Persistence;
pub use types::{
    normalize_app_id, AppShortcut, AppShortcutMap, EngineState, ShortcutBinding, ShortcutRow,
    SystemSnapshot,
};
