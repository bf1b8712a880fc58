//! External control via stdin.
//!
//! A host that knows about focus changes itself (a shell extension, a test
//! harness) drives the daemon with JSON objects, one per line:
//!
//! ```json
//! {"type": "focusChanged", "app": "firefox"}
//! {"type": "setEnabled", "enabled": false}
//! {"type": "toggle"}
//! {"type": "addShortcut", "app": "firefox", "binding": "<Control>f", "name": "Find", "command": "echo find"}
//! {"type": "editShortcut", "originalApp": "firefox", "originalBinding": "<Control>f", "app": "firefox", "binding": "<Control>g", "name": "Find", "command": "echo find"}
//! {"type": "deleteShortcut", "app": "firefox", "binding": "<Control>g"}
//! {"type": "status", "requestId": "req-1"}
//! {"type": "shutdown"}
//! ```
//!
//! Every command accepts an optional `requestId`, echoed in the response line
//! written to stdout. Lines that fail to parse are logged and skipped. End of
//! input means shutdown.

use std::io::BufRead;

use serde::{Deserialize, Serialize};

use crate::engine::{EngineStatus, RemapState};
use crate::logging;
use crate::subscription::{StopSignal, Subscription};

/// Commands accepted on stdin
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ExternalCommand {
    /// Focus moved. `app` is the window class; absent when nothing has focus.
    FocusChanged {
        #[serde(default)]
        app: Option<String>,
        #[serde(default, rename = "requestId")]
        request_id: Option<String>,
    },
    SetEnabled {
        enabled: bool,
        #[serde(default, rename = "requestId")]
        request_id: Option<String>,
    },
    Toggle {
        #[serde(default, rename = "requestId")]
        request_id: Option<String>,
    },
    AddShortcut {
        app: String,
        binding: String,
        name: String,
        command: String,
        #[serde(default, rename = "requestId")]
        request_id: Option<String>,
    },
    EditShortcut {
        #[serde(rename = "originalApp")]
        original_app: String,
        #[serde(rename = "originalBinding")]
        original_binding: String,
        app: String,
        binding: String,
        name: String,
        command: String,
        #[serde(default, rename = "requestId")]
        request_id: Option<String>,
    },
    DeleteShortcut {
        app: String,
        binding: String,
        #[serde(default, rename = "requestId")]
        request_id: Option<String>,
    },
    Status {
        #[serde(default, rename = "requestId")]
        request_id: Option<String>,
    },
    Shutdown {
        #[serde(default, rename = "requestId")]
        request_id: Option<String>,
    },
}

impl ExternalCommand {
    pub fn request_id(&self) -> Option<&str> {
        match self {
            ExternalCommand::FocusChanged { request_id, .. }
            | ExternalCommand::SetEnabled { request_id, .. }
            | ExternalCommand::Toggle { request_id }
            | ExternalCommand::AddShortcut { request_id, .. }
            | ExternalCommand::EditShortcut { request_id, .. }
            | ExternalCommand::DeleteShortcut { request_id, .. }
            | ExternalCommand::Status { request_id }
            | ExternalCommand::Shutdown { request_id } => request_id.as_deref(),
        }
    }

    /// Command name as it appears in the `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            ExternalCommand::FocusChanged { .. } => "focusChanged",
            ExternalCommand::SetEnabled { .. } => "setEnabled",
            ExternalCommand::Toggle { .. } => "toggle",
            ExternalCommand::AddShortcut { .. } => "addShortcut",
            ExternalCommand::EditShortcut { .. } => "editShortcut",
            ExternalCommand::DeleteShortcut { .. } => "deleteShortcut",
            ExternalCommand::Status { .. } => "status",
            ExternalCommand::Shutdown { .. } => "shutdown",
        }
    }
}

/// One line of output per handled command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub ok: bool,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EngineStatus>,
}

impl CommandResponse {
    pub fn ok(command: &ExternalCommand, state: &RemapState) -> Self {
        Self {
            kind: command.kind(),
            request_id: command.request_id().map(str::to_string),
            ok: true,
            state: state.label(),
            app: match state {
                RemapState::Remapped(app) => Some(app.clone()),
                _ => None,
            },
            error: None,
            status: None,
        }
    }

    pub fn failed(command: &ExternalCommand, state: &RemapState, error: String) -> Self {
        Self {
            ok: false,
            error: Some(error),
            ..Self::ok(command, state)
        }
    }

    pub fn with_status(mut self, status: EngineStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// What the listener saw on its input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdinEvent {
    Command(ExternalCommand),
    Closed,
}

/// Parse commands from `reader` until EOF, a read error, or `stop`.
///
/// `emit` returns false once nobody is listening any more.
pub fn read_commands<R, F>(reader: R, stop: &StopSignal, mut emit: F)
where
    R: BufRead,
    F: FnMut(StdinEvent) -> bool,
{
    for line in reader.lines() {
        if stop.is_stopped() {
            return;
        }
        match line {
            Ok(line) if !line.trim().is_empty() => {
                logging::log_debug("STDIN", &format!("Received: {}", line));
                match serde_json::from_str::<ExternalCommand>(&line) {
                    Ok(cmd) => {
                        tracing::debug!(
                            command = cmd.kind(),
                            request_id = cmd.request_id(),
                            "Parsed command"
                        );
                        if !emit(StdinEvent::Command(cmd)) {
                            logging::log("STDIN", "Command channel closed, exiting");
                            return;
                        }
                    }
                    Err(e) => {
                        logging::log("STDIN", &format!("Failed to parse command: {}", e));
                    }
                }
            }
            Ok(_) => {} // Empty line, ignore
            Err(e) => {
                logging::log("STDIN", &format!("Error reading stdin: {}", e));
                break;
            }
        }
    }
    emit(StdinEvent::Closed);
}

/// Listen on stdin in the background.
///
/// The thread sits in a blocking read, so releasing the subscription does not
/// wait for it.
pub fn spawn_stdin_listener<F>(emit: F) -> std::io::Result<Subscription>
where
    F: FnMut(StdinEvent) -> bool + Send + 'static,
{
    Subscription::spawn_detached("stdin", move |stop| {
        logging::log("STDIN", "External command listener started");
        let stdin = std::io::stdin();
        read_commands(stdin.lock(), &stop, emit);
        logging::log("STDIN", "External command listener exiting");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn collect(input: &str) -> Vec<StdinEvent> {
        let mut events = Vec::new();
        read_commands(Cursor::new(input.to_string()), &StopSignal::default(), |event| {
            events.push(event);
            true
        });
        events
    }

    #[test]
    fn focus_changed_with_and_without_app() {
        let cmd: ExternalCommand =
            serde_json::from_str(r#"{"type": "focusChanged", "app": "Firefox"}"#).unwrap();
        assert_eq!(
            cmd,
            ExternalCommand::FocusChanged {
                app: Some("Firefox".to_string()),
                request_id: None
            }
        );

        let cmd: ExternalCommand = serde_json::from_str(r#"{"type": "focusChanged"}"#).unwrap();
        assert!(matches!(cmd, ExternalCommand::FocusChanged { app: None, .. }));
    }

    #[test]
    fn request_id_is_available_on_every_command() {
        let json = r#"{"type": "status", "requestId": "req-123"}"#;
        let cmd: ExternalCommand = serde_json::from_str(json).unwrap();
        assert_eq!(cmd.request_id(), Some("req-123"));
        assert_eq!(cmd.kind(), "status");
    }

    #[test]
    fn edit_shortcut_uses_camel_case_fields() {
        let json = r#"{"type": "editShortcut", "originalApp": "firefox", "originalBinding": "<Control>f",
            "app": "code", "binding": "<Control>k", "name": "Kill", "command": "echo kill"}"#;
        match serde_json::from_str::<ExternalCommand>(json).unwrap() {
            ExternalCommand::EditShortcut {
                original_app,
                original_binding,
                app,
                ..
            } => {
                assert_eq!(original_app, "firefox");
                assert_eq!(original_binding, "<Control>f");
                assert_eq!(app, "code");
            }
            other => panic!("Expected EditShortcut, got {:?}", other),
        }
    }

    #[test]
    fn add_shortcut_requires_all_fields() {
        let json = r#"{"type": "addShortcut", "app": "firefox", "binding": "<Control>f"}"#;
        assert!(serde_json::from_str::<ExternalCommand>(json).is_err());
    }

    #[test]
    fn reader_skips_blank_and_malformed_lines_and_reports_eof() {
        let events = collect("\n{\"type\": \"toggle\"}\nnot json\n{\"type\": \"bogus\"}\n");
        assert_eq!(
            events,
            vec![
                StdinEvent::Command(ExternalCommand::Toggle { request_id: None }),
                StdinEvent::Closed,
            ]
        );
    }

    #[test]
    fn reader_stops_when_receiver_is_gone() {
        let mut seen = 0;
        read_commands(
            Cursor::new("{\"type\": \"toggle\"}\n{\"type\": \"toggle\"}\n".to_string()),
            &StopSignal::default(),
            |_| {
                seen += 1;
                false
            },
        );
        assert_eq!(seen, 1);
    }

    #[test]
    fn response_serialization() {
        let cmd = ExternalCommand::Toggle {
            request_id: Some("r1".to_string()),
        };
        let ok = CommandResponse::ok(&cmd, &RemapState::Remapped("firefox".to_string()));
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["type"], "toggle");
        assert_eq!(json["requestId"], "r1");
        assert_eq!(json["ok"], true);
        assert_eq!(json["state"], "remapped");
        assert_eq!(json["app"], "firefox");
        assert!(json.get("error").is_none());

        let failed = CommandResponse::failed(&cmd, &RemapState::Idle, "nope".to_string());
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"], "nope");
        assert!(json.get("app").is_none());
    }
}
