//! Scriptable [`ManagedConnection`] for connection manager tests.

use std::{
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use wirechain::connection_manager::ManagedConnection;

/// Call made by a connection manager on a [`FakeConnection`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    CloseWhenIdle,
    NotifyPendingShutdown,
    DropConnection,
    TimeoutExpired,
    DumpState(u8),
}

/// Connection whose busy state and idle time are set by the test.
#[derive(Debug, Default)]
pub struct FakeConnection {
    busy: AtomicBool,
    idle_ms: AtomicU64,
    events: Mutex<Vec<ConnectionEvent>>,
}

impl FakeConnection {
    /// An idle connection that has been idle for `idle`.
    pub fn idle(idle: Duration) -> Arc<Self> {
        let conn = Arc::new(Self::default());
        conn.set_idle_time(idle);
        conn
    }

    /// A connection in the middle of a request.
    pub fn busy() -> Arc<Self> {
        let conn = Arc::new(Self::default());
        conn.set_busy(true);
        conn
    }

    pub fn set_busy(&self, busy: bool) { self.busy.store(busy, Ordering::SeqCst); }

    pub fn set_idle_time(&self, idle: Duration) {
        let millis = u64::try_from(idle.as_millis()).unwrap_or(u64::MAX);
        self.idle_ms.store(millis, Ordering::SeqCst);
    }

    /// Every call received, in order.
    pub fn events(&self) -> Vec<ConnectionEvent> { self.events.lock().expect("events lock").clone() }

    /// Number of times `event` was received.
    pub fn count(&self, event: ConnectionEvent) -> usize {
        self.events().into_iter().filter(|seen| *seen == event).count()
    }

    fn record(&self, event: ConnectionEvent) { self.events.lock().expect("events lock").push(event); }
}

impl ManagedConnection for FakeConnection {
    fn is_busy(&self) -> bool { self.busy.load(Ordering::SeqCst) }

    fn idle_time(&self) -> Duration {
        if self.is_busy() {
            Duration::ZERO
        } else {
            Duration::from_millis(self.idle_ms.load(Ordering::SeqCst))
        }
    }

    fn close_when_idle(&self) { self.record(ConnectionEvent::CloseWhenIdle); }

    fn notify_pending_shutdown(&self) { self.record(ConnectionEvent::NotifyPendingShutdown); }

    fn drop_connection(&self) { self.record(ConnectionEvent::DropConnection); }

    fn timeout_expired(&self) { self.record(ConnectionEvent::TimeoutExpired); }

    fn dump_connection_state(&self, verbosity: u8) { self.record(ConnectionEvent::DumpState(verbosity)); }
}
