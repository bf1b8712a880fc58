//! The long-running remapper.
//!
//! Everything that touches the engine happens on the thread calling
//! `Daemon::run`. Producers (focus poller, stdin listener, mapping watcher,
//! signal handler) live on their own threads and only send `DaemonEvent`s
//! into the channel. Deferred work goes through the timer registry, which
//! bounds how long the loop waits for the next event.

use std::io::Write;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::commands::{CommandResponse, ExternalCommand};
use crate::engine::RemapEngine;
use crate::error::{ErrorSeverity, ResultExt};
use crate::focus::ManualFocus;
use crate::logging;
use crate::store::KeybindingStore;
use crate::subscription::Subscription;
use crate::timers::{TimerHandle, TimerRegistry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonEvent {
    /// The focused window may have changed; the engine asks its focus source.
    FocusChanged,
    Command(ExternalCommand),
    /// The mapping document was written by someone.
    MappingChanged,
    /// The state document was written by someone.
    StateChanged,
    Shutdown,
}

pub struct Daemon<S: KeybindingStore + 'static> {
    engine: RemapEngine<S>,
    timers: TimerRegistry<RemapEngine<S>>,
    subscriptions: Vec<Subscription>,
    events_tx: Sender<DaemonEvent>,
    events_rx: Receiver<DaemonEvent>,
    /// Set when focus is pushed by the host instead of polled.
    manual_focus: Option<ManualFocus>,
    reload_debounce: Duration,
    reload_timer: Option<TimerHandle>,
    output: Box<dyn Write>,
    running: bool,
}

impl<S: KeybindingStore + 'static> Daemon<S> {
    pub fn new(
        engine: RemapEngine<S>,
        manual_focus: Option<ManualFocus>,
        reload_debounce: Duration,
        output: Box<dyn Write>,
    ) -> Self {
        let (events_tx, events_rx) = channel();
        Self {
            engine,
            timers: TimerRegistry::new(),
            subscriptions: Vec::new(),
            events_tx,
            events_rx,
            manual_focus,
            reload_debounce,
            reload_timer: None,
            output,
            running: false,
        }
    }

    /// Handle for producers to send events into the loop.
    pub fn sender(&self) -> Sender<DaemonEvent> {
        self.events_tx.clone()
    }

    /// Keep `subscription` alive until shutdown.
    pub fn subscribe(&mut self, subscription: Subscription) {
        debug!(subscription = subscription.name(), "Daemon owns subscription");
        self.subscriptions.push(subscription);
    }

    pub fn engine(&self) -> &RemapEngine<S> {
        &self.engine
    }

    /// Start the engine and process events until shutdown.
    pub fn run(&mut self) {
        self.running = true;
        let state = self.engine.start();
        logging::log("DAEMON", &format!("Started in state {}", state.label()));
        self.engine.on_focus_changed();

        while self.running {
            let event = match self.timers.next_deadline() {
                Some(deadline) => self
                    .events_rx
                    .recv_timeout(deadline.saturating_duration_since(Instant::now())),
                None => self
                    .events_rx
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };

            match event {
                Ok(event) => self.handle(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            self.timers.fire_due(Instant::now(), &mut self.engine);
        }

        self.shutdown();
    }

    fn handle(&mut self, event: DaemonEvent) {
        match event {
            DaemonEvent::FocusChanged => {
                self.engine.on_focus_changed();
            }
            DaemonEvent::Command(command) => {
                let response = self.handle_command(&command);
                self.respond(&response);
            }
            DaemonEvent::MappingChanged => self.schedule_reload(),
            DaemonEvent::StateChanged => {
                self.engine.reload_state();
            }
            DaemonEvent::Shutdown => {
                info!("Shutdown requested");
                self.running = false;
            }
        }
    }

    fn handle_command(&mut self, command: &ExternalCommand) -> CommandResponse {
        info!(
            command = command.kind(),
            request_id = command.request_id(),
            "Handling command"
        );

        let result = match command {
            ExternalCommand::FocusChanged { app, .. } => {
                match &self.manual_focus {
                    Some(focus) => focus.set(app.clone()),
                    None => debug!("Focus is polled, ignoring reported app"),
                }
                self.engine.on_focus_changed();
                Ok(())
            }
            ExternalCommand::SetEnabled { enabled, .. } => {
                self.engine.set_enabled(*enabled);
                Ok(())
            }
            ExternalCommand::Toggle { .. } => {
                self.engine.toggle();
                Ok(())
            }
            ExternalCommand::AddShortcut {
                app,
                binding,
                name,
                command,
                ..
            } => self.engine.add_shortcut(app, binding, name, command),
            ExternalCommand::EditShortcut {
                original_app,
                original_binding,
                app,
                binding,
                name,
                command,
                ..
            } => self.engine.edit_shortcut(
                original_app,
                original_binding,
                app,
                binding,
                name,
                command,
            ),
            ExternalCommand::DeleteShortcut { app, binding, .. } => {
                self.engine.delete_shortcut(app, binding)
            }
            ExternalCommand::Status { .. } => {
                let state = self.engine.state();
                return CommandResponse::ok(command, &state).with_status(self.engine.status());
            }
            ExternalCommand::Shutdown { .. } => {
                self.running = false;
                Ok(())
            }
        };

        let state = self.engine.state();
        match result {
            Ok(()) => CommandResponse::ok(command, &state),
            Err(e) => {
                match e.severity() {
                    ErrorSeverity::Warning => {
                        warn!(command = command.kind(), error = %e, "Command recovered")
                    }
                    ErrorSeverity::Error => {
                        error!(command = command.kind(), error = %e, "Command failed")
                    }
                }
                CommandResponse::failed(command, &state, e.user_message())
            }
        }
    }

    fn respond(&mut self, response: &CommandResponse) {
        let line = match serde_json::to_string(response) {
            Ok(line) => line,
            Err(e) => {
                logging::log_error("DAEMON", &e.to_string(), Some("serializing response"));
                return;
            }
        };
        writeln!(self.output, "{}", line)
            .and_then(|_| self.output.flush())
            .warn_on_err();
    }

    /// Reload the mapping once writes have settled.
    fn schedule_reload(&mut self) {
        if let Some(handle) = self.reload_timer.take() {
            self.timers.cancel(handle);
        }
        let handle = self.timers.schedule(self.reload_debounce, |engine| {
            engine.reload_map();
        });
        self.reload_timer = Some(handle);
    }

    /// Cancel timers, hand the registry back, then release every producer.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&mut self) {
        self.running = false;
        self.timers.cancel_all();
        self.reload_timer = None;
        self.engine.shutdown();

        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
        logging::log("DAEMON", "Stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::config::{Paths, CUSTOM_KEYBINDINGS_PATH};
    use crate::engine::RemapState;
    use crate::shortcuts::{AppShortcutMap, Persistence, ShortcutBinding};
    use crate::store::MemoryStore;

    #[derive(Clone, Default)]
    struct SharedOutput(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedOutput {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedOutput {
        fn lines(&self) -> Vec<serde_json::Value> {
            String::from_utf8_lossy(&self.0.lock())
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        paths: Paths,
        store: MemoryStore,
        output: SharedOutput,
        daemon: Daemon<MemoryStore>,
    }

    fn fixture(mapping: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::in_dir(dir.path());
        std::fs::write(&paths.mapping, mapping).unwrap();

        let store = MemoryStore::with_entries([(
            format!("{}custom0/", CUSTOM_KEYBINDINGS_PATH),
            ShortcutBinding::new("Terminal", "<Super>t", "gnome-terminal"),
        )]);
        let focus = ManualFocus::new();
        let engine = RemapEngine::new(
            store.clone(),
            Box::new(focus.clone()),
            Persistence::new(paths.clone()),
        );
        let output = SharedOutput::default();
        let daemon = Daemon::new(
            engine,
            Some(focus),
            Duration::from_millis(10),
            Box::new(output.clone()),
        );

        Fixture {
            _dir: dir,
            paths,
            store,
            output,
            daemon,
        }
    }

    fn command(json: &str) -> DaemonEvent {
        DaemonEvent::Command(serde_json::from_str(json).unwrap())
    }

    const FIREFOX: &str = r#"{"firefox": {"<Control>f": {"name": "Find", "command": "echo find"}}}"#;

    #[test]
    fn processes_queued_commands_then_restores_on_shutdown() {
        let mut f = fixture(FIREFOX);
        let tx = f.daemon.sender();
        tx.send(command(r#"{"type": "focusChanged", "app": "Firefox", "requestId": "a"}"#))
            .unwrap();
        tx.send(command(r#"{"type": "status", "requestId": "b"}"#))
            .unwrap();
        tx.send(command(r#"{"type": "shutdown"}"#)).unwrap();

        f.daemon.run();

        let lines = f.output.lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["requestId"], "a");
        assert_eq!(lines[0]["state"], "remapped");
        assert_eq!(lines[0]["app"], "firefox");
        assert_eq!(lines[1]["status"]["remappedApp"], "firefox");
        assert_eq!(lines[2]["type"], "shutdown");

        assert!(f.store.owned_view().is_empty());
        assert!(f.paths.state.exists());
    }

    #[test]
    fn failed_command_reports_user_message() {
        let mut f = fixture(FIREFOX);
        let tx = f.daemon.sender();
        tx.send(command(
            r#"{"type": "deleteShortcut", "app": "code", "binding": "<Control>k"}"#,
        ))
        .unwrap();
        tx.send(DaemonEvent::Shutdown).unwrap();

        f.daemon.run();

        let lines = f.output.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["ok"], false);
        assert_eq!(lines[0]["error"], "There is no shortcut <Control>k for code");
    }

    #[test]
    fn mapping_changes_are_debounced_into_one_reload() {
        let mut f = fixture("{}");
        f.daemon.engine.start();
        f.daemon
            .handle(command(r#"{"type": "focusChanged", "app": "firefox"}"#));
        assert_eq!(f.daemon.engine.state(), RemapState::Idle);

        let mut map = AppShortcutMap::new();
        map.add_shortcut("firefox", "<Control>f", "Find", "echo find")
            .unwrap();
        Persistence::new(f.paths.clone()).save_map(&map).unwrap();

        for _ in 0..3 {
            f.daemon.handle(DaemonEvent::MappingChanged);
        }
        assert_eq!(f.daemon.timers.len(), 1);

        let fired = f
            .daemon
            .timers
            .fire_due(Instant::now() + Duration::from_secs(1), &mut f.daemon.engine);
        assert_eq!(fired, 1);
        assert_eq!(
            f.daemon.engine.state(),
            RemapState::Remapped("firefox".to_string())
        );
    }

    #[test]
    fn shutdown_cancels_pending_reload_and_releases_subscriptions() {
        let mut f = fixture(FIREFOX);
        f.daemon.engine.start();
        f.daemon.handle(DaemonEvent::MappingChanged);

        let sub = Subscription::spawn("idle", |stop| {
            while !stop.is_stopped() {
                std::thread::sleep(Duration::from_millis(5));
            }
        })
        .unwrap();
        f.daemon.subscribe(sub);

        f.daemon.shutdown();
        assert!(f.daemon.timers.is_empty());
        assert!(f.daemon.subscriptions.is_empty());

        // Second call finds nothing left to release
        f.daemon.shutdown();
    }

    #[test]
    fn state_written_elsewhere_is_followed() {
        let mut f = fixture(FIREFOX);
        f.daemon.engine.start();
        f.daemon
            .handle(command(r#"{"type": "focusChanged", "app": "firefox"}"#));
        assert!(!f.store.owned_view().is_empty());

        Persistence::new(f.paths.clone())
            .save_state(&crate::shortcuts::EngineState { enabled: false })
            .unwrap();
        f.daemon.handle(DaemonEvent::StateChanged);

        assert_eq!(f.daemon.engine.state(), RemapState::Disabled);
        assert!(f.store.owned_view().is_empty());
    }
}
