//! Owned handles for background event producers.
//!
//! Every producer (focus poller, stdin listener, mapping watcher) runs on its
//! own thread and is represented by a `Subscription`. Releasing the handle,
//! either through `unsubscribe()` or by dropping it, raises the stop flag and
//! joins the thread. Release happens exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

/// Stop flag handed to a producer thread.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns true if this call raised the flag.
    fn raise(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct Subscription {
    name: &'static str,
    stop: StopSignal,
    thread: Option<JoinHandle<()>>,
    join_on_release: bool,
}

impl Subscription {
    /// Run `producer` on a named thread; it should return once the signal is stopped.
    pub fn spawn<F>(name: &'static str, producer: F) -> std::io::Result<Self>
    where
        F: FnOnce(StopSignal) + Send + 'static,
    {
        Self::spawn_inner(name, producer, true)
    }

    /// Like `spawn`, but release does not wait for the thread.
    ///
    /// For producers parked in a blocking read (stdin) that only notice the
    /// stop signal on their next wake-up.
    pub fn spawn_detached<F>(name: &'static str, producer: F) -> std::io::Result<Self>
    where
        F: FnOnce(StopSignal) + Send + 'static,
    {
        Self::spawn_inner(name, producer, false)
    }

    fn spawn_inner<F>(name: &'static str, producer: F, join_on_release: bool) -> std::io::Result<Self>
    where
        F: FnOnce(StopSignal) + Send + 'static,
    {
        let stop = StopSignal::default();
        let thread_stop = stop.clone();
        let thread = thread::Builder::new()
            .name(format!("spa-{}", name))
            .spawn(move || producer(thread_stop))?;

        debug!(subscription = name, "Subscribed");
        Ok(Self {
            name,
            stop,
            thread: Some(thread),
            join_on_release,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_active(&self) -> bool {
        !self.stop.is_stopped()
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.stop.raise() {
            return;
        }
        if let Some(thread) = self.thread.take() {
            if self.join_on_release && thread.join().is_err() {
                warn!(subscription = self.name, "Producer thread panicked");
            }
        }
        debug!(subscription = self.name, "Unsubscribed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counting_producer(exits: Arc<AtomicUsize>) -> impl FnOnce(StopSignal) + Send + 'static {
        move |stop: StopSignal| {
            while !stop.is_stopped() {
                thread::sleep(Duration::from_millis(5));
            }
            exits.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn unsubscribe_stops_and_joins_producer() {
        let exits = Arc::new(AtomicUsize::new(0));
        let sub = Subscription::spawn("test", counting_producer(exits.clone())).unwrap();
        assert!(sub.is_active());

        sub.unsubscribe();
        assert_eq!(exits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_releases_once() {
        let exits = Arc::new(AtomicUsize::new(0));
        {
            let mut sub = Subscription::spawn("test", counting_producer(exits.clone())).unwrap();
            sub.release();
            assert!(!sub.is_active());
        }
        assert_eq!(exits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn detached_release_does_not_block() {
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let sub = Subscription::spawn_detached("blocked", move |_stop| {
            // Parked until the test ends, like a blocking stdin read
            let _ = rx.recv();
        })
        .unwrap();

        sub.unsubscribe();
        drop(tx);
    }
}
