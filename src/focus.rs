//! Which application has keyboard focus.
//!
//! The engine asks a `FocusSource` for the focused window's class every time
//! a focus change is delivered. Two sources exist:
//!
//! - `XpropFocusSource` queries the X server (`_NET_ACTIVE_WINDOW`, then
//!   `WM_CLASS`) through the `xprop` binary.
//! - `ManualFocus` holds whatever the host last reported, for hosts that push
//!   focus changes themselves (and for tests).
//!
//! `spawn_focus_poller` turns any source into a change notification stream.

use std::process::Command;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::subscription::{StopSignal, Subscription};

pub trait FocusSource {
    /// Class of the focused window as reported (not lowercased), or None.
    fn focused_class(&self) -> Option<String>;
}

impl<T: FocusSource + ?Sized> FocusSource for Box<T> {
    fn focused_class(&self) -> Option<String> {
        (**self).focused_class()
    }
}

/// Focus as reported by the host.
#[derive(Debug, Clone, Default)]
pub struct ManualFocus {
    current: Arc<Mutex<Option<String>>>,
}

impl ManualFocus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, class: Option<String>) {
        *self.current.lock() = class.filter(|c| !c.trim().is_empty());
    }
}

impl FocusSource for ManualFocus {
    fn focused_class(&self) -> Option<String> {
        self.current.lock().clone()
    }
}

/// Focus from the X server via `xprop`.
#[derive(Debug, Clone)]
pub struct XpropFocusSource {
    bin: String,
}

impl XpropFocusSource {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    fn xprop(&self, args: &[&str]) -> Option<String> {
        let output = Command::new(&self.bin).args(args).output().ok()?;
        if !output.status.success() {
            debug!(bin = %self.bin, ?args, "xprop failed");
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl FocusSource for XpropFocusSource {
    fn focused_class(&self) -> Option<String> {
        let root = self.xprop(&["-root", "_NET_ACTIVE_WINDOW"])?;
        let window = parse_active_window(&root)?;
        let class = self.xprop(&["-id", &window, "WM_CLASS"])?;
        parse_wm_class(&class)
    }
}

/// `_NET_ACTIVE_WINDOW(WINDOW): window id # 0x3a00007` -> `0x3a00007`.
/// A zero id means nothing is focused.
fn parse_active_window(output: &str) -> Option<String> {
    let id = output.split('#').nth(1)?.split(',').next()?.trim();
    let digits = id.trim_start_matches("0x");
    if id.is_empty() || digits.chars().all(|c| c == '0') {
        return None;
    }
    Some(id.to_string())
}

/// `WM_CLASS(STRING) = "Navigator", "firefox"` -> `firefox`.
///
/// The class is the last string; the first is the instance name.
fn parse_wm_class(output: &str) -> Option<String> {
    let (_, values) = output.split_once('=')?;
    values
        .split(',')
        .map(|part| part.trim().trim_matches('"'))
        .filter(|part| !part.is_empty())
        .last()
        .map(str::to_string)
}

/// Poll `source` every `interval` and call `on_change` when the class changes.
///
/// The first observation is reported too, so a consumer starts in sync.
pub fn spawn_focus_poller<F, C>(
    source: F,
    interval: Duration,
    on_change: C,
) -> std::io::Result<Subscription>
where
    F: FocusSource + Send + 'static,
    C: Fn(Option<String>) + Send + 'static,
{
    Subscription::spawn("focus-poller", move |stop: StopSignal| {
        info!(interval_ms = interval.as_millis() as u64, "Focus poller started");
        let mut last: Option<Option<String>> = None;
        while !stop.is_stopped() {
            let current = source.focused_class();
            if last.as_ref() != Some(&current) {
                debug!(class = ?current, "Focus changed");
                on_change(current.clone());
                last = Some(current);
            }
            thread::sleep(interval);
        }
        info!("Focus poller stopped");
    })
}
