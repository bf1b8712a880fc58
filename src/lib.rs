//! shortcuts-per-app - per-application GNOME custom keybindings
//!
//! Swaps the desktop's custom keybindings for an application-specific set
//! while that application has focus, and puts the user's own shortcuts back
//! when focus moves on or remapping is disabled.

pub mod commands;
pub mod config;
pub mod daemon;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod focus;
pub mod logging;
pub mod shortcuts;
pub mod store;
pub mod subscription;
pub mod timers;
pub mod watcher;
