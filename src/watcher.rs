use notify::{recommended_watcher, EventKind, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::time::Duration;

use tracing::{info, warn};

use crate::subscription::{StopSignal, Subscription};

/// How often the watch loop checks whether it was unsubscribed.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Which of `watched` does `event` create or modify?
///
/// Only file names are compared: atomic saves land via a rename, which some
/// backends report with a path that differs from the one we watch (symlinked
/// config dirs, for instance).
fn changed_document<'a>(event: &notify::Event, watched: &'a [PathBuf]) -> Option<&'a PathBuf> {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return None;
    }
    watched.iter().find(|doc| {
        event
            .paths
            .iter()
            .any(|path| path.file_name().is_some() && path.file_name() == doc.file_name())
    })
}

/// Watch the given documents and call `on_change` with the one that was written.
///
/// Events arrive in bursts (one save is a create, a write and a rename), so
/// callers debounce. Parent directories are created if needed so the watch
/// can be established before the first save.
pub fn spawn_document_watcher<F>(documents: Vec<PathBuf>, on_change: F) -> std::io::Result<Subscription>
where
    F: Fn(&Path) + Send + 'static,
{
    let dirs: BTreeSet<PathBuf> = documents
        .iter()
        .map(|doc| {
            doc.parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        })
        .collect();
    for dir in &dirs {
        fs::create_dir_all(dir)?;
    }

    Subscription::spawn("document-watcher", move |stop: StopSignal| {
        if let Err(e) = watch_loop(&dirs, &documents, &stop, &on_change) {
            warn!(error = %e, watcher = "documents", "Document watcher error");
        }
    })
}

fn watch_loop<F: Fn(&Path)>(
    dirs: &BTreeSet<PathBuf>,
    documents: &[PathBuf],
    stop: &StopSignal,
    on_change: &F,
) -> notify::Result<()> {
    let (watch_tx, watch_rx) = channel();
    let mut watcher = recommended_watcher(move |res: notify::Result<notify::Event>| {
        let _ = watch_tx.send(res);
    })?;
    for dir in dirs {
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        info!(path = %dir.display(), "Document watcher started");
    }

    while !stop.is_stopped() {
        match watch_rx.recv_timeout(STOP_POLL_INTERVAL) {
            Ok(Ok(event)) => {
                if let Some(doc) = changed_document(&event, documents) {
                    on_change(doc.as_path());
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, watcher = "documents", "File watcher error");
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(watcher = "documents", "Document watcher shutting down");
    Ok(())
}
