//! Configuration module - daemon settings and document locations
//!
//! # Module Structure
//!
//! - `defaults` - All default constant values (file names, schema ids, markers)
//! - `types` - `Config`, `FocusBackend` and the resolved document `Paths`
//! - `loader` - File system loading with fallback to defaults

mod defaults;
mod loader;
mod types;

pub use defaults::*;
pub use loader::{default_config_path, load_config, load_config_from};
pub use types::{default_config_dir, Config, FocusBackend, Paths};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
