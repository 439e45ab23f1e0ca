//! Cancelable timeouts consumed by the connection manager.
//!
//! The manager only needs to arm, re-arm and cancel named timeouts.
//! [`TimerWheel`] backs that with a tokio [`DelayQueue`] and is driven by
//! awaiting [`TimerWheel::next_expired`]; [`ManualTimer`] records requests
//! and leaves expiry to the caller, which keeps manager tests deterministic.

use std::{
    collections::{HashMap, hash_map::Entry},
    future::poll_fn,
    time::Duration,
};

use tokio_util::time::{DelayQueue, delay_queue};

use crate::connection_manager::ConnectionKey;

/// Identity of a timeout armed by a connection manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimeoutId {
    /// Idle timeout of a managed connection.
    Connection(ConnectionKey),
    /// End of the graceful shutdown grace period.
    IdleGrace,
}

/// Scheduling service for named, cancelable timeouts.
pub trait TimerService: Send {
    /// Arm `id` to expire after `after`. Re-arming an armed id replaces its
    /// deadline.
    fn schedule_timeout(&mut self, id: TimeoutId, after: Duration);

    /// Disarm `id`. Returns `false` if it was not armed.
    fn cancel_timeout(&mut self, id: TimeoutId) -> bool;

    /// Whether `id` is currently armed.
    fn is_scheduled(&self, id: TimeoutId) -> bool;
}

/// [`TimerService`] backed by [`DelayQueue`].
///
/// Scheduling requires a tokio runtime with the time driver enabled.
#[derive(Debug, Default)]
pub struct TimerWheel {
    queue: DelayQueue<TimeoutId>,
    keys: HashMap<TimeoutId, delay_queue::Key>,
}

impl TimerWheel {
    /// Create an empty wheel.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Number of armed timeouts.
    #[must_use]
    pub fn len(&self) -> usize { self.keys.len() }

    /// Whether no timeout is armed.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.keys.is_empty() }

    /// Wait for the next timeout to expire and disarm it.
    ///
    /// Stays pending while nothing is armed. Timeouts armed after the future
    /// was created are only observed by a fresh call, so drive it from a
    /// `select!` loop that recreates it each iteration.
    pub async fn next_expired(&mut self) -> TimeoutId {
        match poll_fn(|cx| self.queue.poll_expired(cx)).await {
            Some(expired) => {
                let id = expired.into_inner();
                self.keys.remove(&id);
                id
            }
            None => std::future::pending().await,
        }
    }
}

impl TimerService for TimerWheel {
    fn schedule_timeout(&mut self, id: TimeoutId, after: Duration) {
        match self.keys.entry(id) {
            Entry::Occupied(entry) => self.queue.reset(entry.get(), after),
            Entry::Vacant(entry) => {
                entry.insert(self.queue.insert(id, after));
            }
        }
    }

    fn cancel_timeout(&mut self, id: TimeoutId) -> bool {
        self.keys
            .remove(&id)
            .map(|key| self.queue.remove(&key))
            .is_some()
    }

    fn is_scheduled(&self, id: TimeoutId) -> bool { self.keys.contains_key(&id) }
}

/// [`TimerService`] that only records what was asked of it.
///
/// Tests arm timeouts through the manager, then call [`fire`](Self::fire)
/// and hand the id to the manager's `handle_timeout`.
#[derive(Debug, Default)]
pub struct ManualTimer {
    armed: HashMap<TimeoutId, Duration>,
    history: Vec<(TimeoutId, Duration)>,
}

impl ManualTimer {
    /// Create a timer with nothing armed.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Duration `id` was last armed with, if it is still armed.
    #[must_use]
    pub fn scheduled(&self, id: TimeoutId) -> Option<Duration> { self.armed.get(&id).copied() }

    /// Number of armed timeouts.
    #[must_use]
    pub fn len(&self) -> usize { self.armed.len() }

    /// Whether no timeout is armed.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.armed.is_empty() }

    /// Every schedule request in order, including re-arms.
    #[must_use]
    pub fn history(&self) -> &[(TimeoutId, Duration)] { &self.history }

    /// Expire `id`, disarming it. Returns `false` if it was not armed.
    pub fn fire(&mut self, id: TimeoutId) -> bool { self.armed.remove(&id).is_some() }
}

impl TimerService for ManualTimer {
    fn schedule_timeout(&mut self, id: TimeoutId, after: Duration) {
        self.armed.insert(id, after);
        self.history.push((id, after));
    }

    fn cancel_timeout(&mut self, id: TimeoutId) -> bool { self.armed.remove(&id).is_some() }

    fn is_scheduled(&self, id: TimeoutId) -> bool { self.armed.contains_key(&id) }
}
