//! Deferred callbacks for the single-threaded daemon loop.
//!
//! Timers never run on their own thread: the loop asks for `next_deadline()`
//! to bound its wait and then calls `fire_due()`. Callbacks receive the loop's
//! context mutably, so they touch engine state without locking.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

type Callback<C> = Box<dyn FnOnce(&mut C)>;

struct PendingTimer<C> {
    deadline: Instant,
    callback: Callback<C>,
}

pub struct TimerRegistry<C> {
    next_id: u64,
    pending: HashMap<TimerHandle, PendingTimer<C>>,
}

impl<C> Default for TimerRegistry<C> {
    fn default() -> Self {
        Self {
            next_id: 0,
            pending: HashMap::new(),
        }
    }
}

impl<C> TimerRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, delay: Duration, callback: impl FnOnce(&mut C) + 'static) -> TimerHandle {
        self.schedule_at(Instant::now() + delay, callback)
    }

    pub fn schedule_at(
        &mut self,
        deadline: Instant,
        callback: impl FnOnce(&mut C) + 'static,
    ) -> TimerHandle {
        self.next_id += 1;
        let handle = TimerHandle(self.next_id);
        self.pending.insert(
            handle,
            PendingTimer {
                deadline,
                callback: Box::new(callback),
            },
        );
        handle
    }

    /// Returns false if the timer already fired or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.pending.remove(&handle).is_some()
    }

    pub fn cancel_all(&mut self) {
        self.pending.clear();
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|t| t.deadline).min()
    }

    /// Run every timer due at `now`, earliest first. Returns how many ran.
    pub fn fire_due(&mut self, now: Instant, context: &mut C) -> usize {
        let mut due: Vec<(Instant, TimerHandle)> = self
            .pending
            .iter()
            .filter(|(_, t)| t.deadline <= now)
            .map(|(handle, t)| (t.deadline, *handle))
            .collect();
        due.sort();

        let mut fired = 0;
        for (_, handle) in due {
            if let Some(timer) = self.pending.remove(&handle) {
                (timer.callback)(context);
                fired += 1;
            }
        }
        fired
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
