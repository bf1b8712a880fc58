//! shortcuts-per-app - per-application GNOME custom keybindings
//!
//! # Usage
//!
//! ```bash
//! # Run the remapper (focus polled with xprop)
//! shortcuts-per-app run
//!
//! # Let a host push focus changes and commands as JSONL on stdin
//! echo '{"type": "focusChanged", "app": "firefox"}' | shortcuts-per-app run --stdin
//!
//! # Manage the mapping
//! shortcuts-per-app add firefox '<Control>f' Find 'echo find'
//! shortcuts-per-app list
//! ```

use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use shortcuts_per_app::commands::{spawn_stdin_listener, StdinEvent};
use shortcuts_per_app::config::{self, Config, FocusBackend};
use shortcuts_per_app::daemon::{Daemon, DaemonEvent};
use shortcuts_per_app::engine::RemapEngine;
use shortcuts_per_app::focus::{spawn_focus_poller, FocusSource, ManualFocus, XpropFocusSource};
use shortcuts_per_app::logging::{self, LogOptions};
use shortcuts_per_app::shortcuts::{AppShortcutMap, EngineState, Persistence};
use shortcuts_per_app::store::{is_owned, read_system_entries, GSettingsStore, KeybindingStore, MemoryStore};
use shortcuts_per_app::watcher::spawn_document_watcher;

#[derive(Parser, Debug)]
#[command(name = "shortcuts-per-app", version, about = "Per-application GNOME custom shortcuts")]
struct Cli {
    /// Daemon config file (default: <config dir>/shortcuts-per-app-daemon.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Remap shortcuts as focus changes until interrupted
    Run {
        /// Work on an in-memory copy of the keybindings instead of the real ones
        #[arg(long)]
        dry_run: bool,
        /// Accept JSONL commands on stdin
        #[arg(long)]
        stdin: bool,
    },
    /// List configured shortcuts
    List {
        #[arg(long)]
        json: bool,
    },
    /// Add (or replace) a shortcut for an application
    Add {
        app: String,
        binding: String,
        name: String,
        command: String,
    },
    /// Change an existing shortcut
    Edit {
        app: String,
        binding: String,
        #[arg(long = "app")]
        new_app: Option<String>,
        #[arg(long = "binding")]
        new_binding: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        command: Option<String>,
    },
    /// Remove a shortcut
    Remove { app: String, binding: String },
    /// Turn remapping on
    Enable,
    /// Turn remapping off and restore the original shortcuts
    Disable,
    /// Flip between enabled and disabled
    Toggle,
    /// Show engine state, documents and registry health
    Status,
    /// Print the class of the focused window
    ActiveWindow,
    /// Remove every overlay entry and put back the snapshotted shortcuts
    Restore,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    };

    let daemon = matches!(cli.command, Command::Run { .. });
    let _guard = logging::init(&LogOptions {
        stderr_only: !daemon,
        default_filter: if daemon { "info" } else { "warn" }.to_string(),
        ..LogOptions::default()
    });

    let persistence = Persistence::new(config.paths());

    match cli.command {
        Command::Run { dry_run, stdin } => run(&config, persistence, dry_run, stdin),
        Command::List { json } => list(&persistence, json),
        Command::Add {
            app,
            binding,
            name,
            command,
        } => update_map(&persistence, |map| {
            map.add_shortcut(&app, &binding, &name, &command)
        }),
        Command::Edit {
            app,
            binding,
            new_app,
            new_binding,
            name,
            command,
        } => {
            let current = persistence.load_map();
            let app_id = shortcuts_per_app::shortcuts::normalize_app_id(&app);
            let Some(existing) = current.shortcut(&app_id, binding.trim()) else {
                bail!("There is no shortcut {} for {}", binding, app);
            };
            let name = name.unwrap_or_else(|| existing.name.clone());
            let command = command.unwrap_or_else(|| existing.command.clone());
            let new_app = new_app.unwrap_or_else(|| app.clone());
            let new_binding = new_binding.unwrap_or_else(|| binding.clone());
            update_map(&persistence, |map| {
                map.edit_shortcut(&app, &binding, &new_app, &new_binding, &name, &command)
            })
        }
        Command::Remove { app, binding } => update_map(&persistence, |map| {
            map.delete_shortcut(&app, &binding).map(|_| ())
        }),
        Command::Enable => set_enabled(&config, &persistence, true),
        Command::Disable => set_enabled(&config, &persistence, false),
        Command::Toggle => {
            let enabled = !persistence.load_state().enabled;
            set_enabled(&config, &persistence, enabled)
        }
        Command::Status => status(&config, &persistence),
        Command::ActiveWindow => {
            let focus = XpropFocusSource::new(&config.xprop_bin);
            match focus.focused_class() {
                Some(class) => println!("{}", class),
                None => println!("none"),
            }
            Ok(())
        }
        Command::Restore => restore(&config, persistence),
    }
}

fn run(config: &Config, persistence: Persistence, dry_run: bool, stdin: bool) -> Result<()> {
    let external_focus = config.focus_backend == FocusBackend::External;
    if external_focus && !stdin {
        info!("External focus backend selected, reading stdin");
    }
    let stdin = stdin || external_focus;

    let manual_focus = external_focus.then(ManualFocus::new);
    let focus: Box<dyn FocusSource> = match &manual_focus {
        Some(focus) => Box::new(focus.clone()),
        None => Box::new(XpropFocusSource::new(&config.xprop_bin)),
    };

    if dry_run {
        let live = GSettingsStore::new(&config.gsettings_bin);
        let store = match read_system_entries(&live) {
            Ok(entries) => MemoryStore::with_entries(entries),
            Err(e) => {
                warn!(error = %e, "Cannot read keybindings, dry run starts empty");
                MemoryStore::new()
            }
        };
        logging::log("APP", "Dry run: keybinding changes stay in memory");
        run_daemon(config, store, focus, manual_focus, persistence, stdin)
    } else {
        let store = GSettingsStore::new(&config.gsettings_bin);
        run_daemon(config, store, focus, manual_focus, persistence, stdin)
    }
}

fn run_daemon<S: KeybindingStore + 'static>(
    config: &Config,
    store: S,
    focus: Box<dyn FocusSource>,
    manual_focus: Option<ManualFocus>,
    persistence: Persistence,
    stdin: bool,
) -> Result<()> {
    let paths = persistence.paths().clone();
    let engine = RemapEngine::new(store, focus, persistence);
    let mut daemon = Daemon::new(
        engine,
        manual_focus.clone(),
        Duration::from_millis(config.reload_debounce_ms),
        Box::new(std::io::stdout()),
    );

    let tx = daemon.sender();
    install_signal_handler(tx.clone())?;

    if manual_focus.is_none() {
        let poll_tx = tx.clone();
        let poller = spawn_focus_poller(
            XpropFocusSource::new(&config.xprop_bin),
            Duration::from_millis(config.focus_poll_interval_ms),
            move |_class| {
                let _ = poll_tx.send(DaemonEvent::FocusChanged);
            },
        )
        .context("Failed to start focus poller")?;
        daemon.subscribe(poller);
    }

    if stdin {
        let stdin_tx = tx.clone();
        let listener = spawn_stdin_listener(move |event| match event {
            StdinEvent::Command(cmd) => stdin_tx.send(DaemonEvent::Command(cmd)).is_ok(),
            StdinEvent::Closed => {
                let _ = stdin_tx.send(DaemonEvent::Shutdown);
                false
            }
        })
        .context("Failed to start stdin listener")?;
        daemon.subscribe(listener);
    }

    if config.watch_mapping {
        let watch_tx = tx;
        let mapping = paths.mapping.clone();
        match spawn_document_watcher(vec![paths.mapping, paths.state], move |doc| {
            let event = if doc == mapping {
                DaemonEvent::MappingChanged
            } else {
                DaemonEvent::StateChanged
            };
            let _ = watch_tx.send(event);
        }) {
            Ok(watcher) => daemon.subscribe(watcher),
            Err(e) => warn!(error = %e, "Document watcher unavailable, edits need a restart"),
        }
    }

    daemon.run();
    Ok(())
}

fn install_signal_handler(tx: Sender<DaemonEvent>) -> Result<()> {
    ctrlc::set_handler(move || {
        let _ = tx.send(DaemonEvent::Shutdown);
    })
    .context("Failed to install signal handler")
}

fn list(persistence: &Persistence, json: bool) -> Result<()> {
    let rows = persistence.load_map().rows();
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("No shortcuts configured");
        return Ok(());
    }
    for row in rows {
        println!("{:<20} {:<24} {:<24} {}", row.app, row.binding, row.name, row.command);
    }
    Ok(())
}

/// Apply one edit to the mapping document. A running daemon picks it up.
fn update_map<F>(persistence: &Persistence, edit: F) -> Result<()>
where
    F: FnOnce(&mut AppShortcutMap) -> shortcuts_per_app::error::Result<()>,
{
    let mut map = persistence.load_map();
    edit(&mut map).map_err(|e| anyhow::anyhow!(e.user_message()))?;
    persistence
        .save_map(&map)
        .with_context(|| format!("Failed to save {}", persistence.paths().mapping.display()))?;
    println!("{} shortcuts configured", map.len());
    Ok(())
}

/// Record the flag; a running daemon follows the state document. Disabling
/// also restores the registry right away in case no daemon is running.
fn set_enabled(config: &Config, persistence: &Persistence, enabled: bool) -> Result<()> {
    persistence
        .save_state(&EngineState { enabled })
        .with_context(|| format!("Failed to save {}", persistence.paths().state.display()))?;
    println!("{}", if enabled { "enabled" } else { "disabled" });
    if !enabled {
        restore(config, persistence.clone())?;
    }
    Ok(())
}

fn restore(config: &Config, persistence: Persistence) -> Result<()> {
    let store = GSettingsStore::new(&config.gsettings_bin);
    let mut engine = RemapEngine::new(store, Box::new(ManualFocus::new()), persistence);
    engine.start();
    engine.restore();

    let lingering = engine
        .store()
        .list()
        .context("Cannot read keybindings")?
        .iter()
        .filter(|id| is_owned(id))
        .count();
    if lingering > 0 {
        bail!("{} overlay entries could not be removed", lingering);
    }
    println!("Original shortcuts restored");
    Ok(())
}

fn status(config: &Config, persistence: &Persistence) -> Result<()> {
    let map = persistence.load_map();
    let snapshot = persistence.load_snapshot();
    let state = persistence.load_state();
    let store = GSettingsStore::new(&config.gsettings_bin);

    let registry = match store.list() {
        Ok(ids) => serde_json::json!({
            "available": true,
            "entries": ids.len(),
            "overlayEntries": ids.iter().filter(|id| is_owned(id)).count(),
        }),
        Err(e) => serde_json::json!({ "available": false, "error": e.to_string() }),
    };

    let paths = persistence.paths();
    let report = serde_json::json!({
        "enabled": state.enabled,
        "apps": map.apps().count(),
        "shortcuts": map.len(),
        "snapshotEntries": snapshot.shortcuts.len(),
        "snapshotHash": snapshot.hash.as_ref().map(|h| h.as_str()),
        "registry": registry,
        "documents": {
            "mapping": paths.mapping,
            "snapshot": paths.snapshot,
            "state": paths.state,
        },
        "log": logging::log_path(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
