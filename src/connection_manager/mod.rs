//! Connection lifecycle tracking, idle timeouts and graceful shutdown.
//!
//! A [`ConnectionManager`] keeps its connections in a recency list: the most
//! recently active connection sits at the front and idle connections collect
//! at the back. A separate idle marker points at the first idle connection
//! and drives early dropping under load.
//!
//! Graceful shutdown runs in two phases, each a series of sweeps that visit
//! at most [`DRAIN_BATCH`] connections:
//!
//! 1. [`DrainPhase::NotifyPendingShutdown`] warns every connection.
//! 2. [`DrainPhase::CloseWhenIdle`] closes idle connections and asks busy
//!    ones to close once they become idle.
//!
//! The manager is single-owner: every operation takes `&mut self` and there
//! is no internal locking.

mod callback;
mod config;
mod list;
mod managed;

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

pub use callback::ConnectionManagerCallback;
pub use config::{ConfigError, ConnectionManagerConfig};
pub use list::ConnectionKey;
use list::RecencyList;
use log::{debug, info, trace};
pub use managed::ManagedConnection;

use crate::{
    metrics,
    timer::{TimeoutId, TimerService, TimerWheel},
};

/// Most connections visited by a single drain sweep.
pub const DRAIN_BATCH: usize = 64;

/// Connections whose state is dumped by
/// [`drop_all_connections`](ConnectionManager::drop_all_connections).
const MAX_CONNS_TO_DUMP: usize = 2;

/// Progress of a graceful shutdown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainPhase {
    /// No shutdown has been initiated.
    Running,
    /// Connections are being warned of the pending shutdown.
    NotifyPendingShutdown,
    /// Idle connections are being closed.
    CloseWhenIdle,
    /// Every connection has been visited in the closing phase.
    Complete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Cursor {
    At(ConnectionKey),
    End,
}

struct ManagedNode {
    conn: Arc<dyn ManagedConnection>,
    timeout_armed: bool,
    notified: bool,
    close_when_idle: bool,
}

/// Tracks live connections, their idle timeouts and shutdown.
pub struct ConnectionManager<T: TimerService = TimerWheel> {
    conns: RecencyList<ManagedNode>,
    by_identity: HashMap<usize, ConnectionKey>,
    idle_iterator: Option<ConnectionKey>,
    phase: DrainPhase,
    cursor: Cursor,
    sweep_pending: bool,
    callback: Option<Box<dyn ConnectionManagerCallback<T>>>,
    timer: T,
    timeout: Duration,
    early_drop_threshold: Duration,
}

impl<T: TimerService> fmt::Debug for ConnectionManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connections", &self.conns.len())
            .field("idle_iterator", &self.idle_iterator)
            .field("phase", &self.phase)
            .field("timeout", &self.timeout)
            .field("early_drop_threshold", &self.early_drop_threshold)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager<TimerWheel> {
    /// Create a manager driven by a [`TimerWheel`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails validation.
    pub fn new(config: ConnectionManagerConfig) -> Result<Self, ConfigError> {
        Self::with_timer(config, TimerWheel::new())
    }
}

fn identity(conn: &Arc<dyn ManagedConnection>) -> usize { Arc::as_ptr(conn).cast::<()>() as usize }

impl<T: TimerService> ConnectionManager<T> {
    /// Create a manager scheduling its timeouts on `timer`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails validation.
    pub fn with_timer(config: ConnectionManagerConfig, timer: T) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            conns: RecencyList::default(),
            by_identity: HashMap::new(),
            idle_iterator: None,
            phase: DrainPhase::Running,
            cursor: Cursor::End,
            sweep_pending: false,
            callback: None,
            timer,
            timeout: config.timeout(),
            early_drop_threshold: config.early_drop_threshold(),
        })
    }

    /// Install the membership observer, replacing any previous one.
    pub fn set_callback(&mut self, callback: Box<dyn ConnectionManagerCallback<T>>) {
        self.callback = Some(callback);
    }

    /// Number of managed connections.
    #[must_use]
    pub fn num_connections(&self) -> usize { self.conns.len() }

    /// Whether the manager holds no connections.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.conns.is_empty() }

    /// Idle timeout armed for connections added with a timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration { self.timeout }

    /// Idle time a connection must exceed to be dropped early.
    #[must_use]
    pub fn early_drop_threshold(&self) -> Duration { self.early_drop_threshold }

    /// Current shutdown phase.
    #[must_use]
    pub fn drain_phase(&self) -> DrainPhase { self.phase }

    /// Whether a drain sweep is waiting to run.
    #[must_use]
    pub fn needs_sweep(&self) -> bool { self.sweep_pending }

    /// The first idle connection, or `None` if no connection has gone idle
    /// since the busy connections ahead of it.
    #[must_use]
    pub fn idle_connection(&self) -> Option<ConnectionKey> { self.idle_iterator }

    /// Whether `key` refers to a connection held by this manager.
    #[must_use]
    pub fn contains(&self, key: ConnectionKey) -> bool { self.conns.contains(key) }

    /// The connection stored under `key`.
    #[must_use]
    pub fn get(&self, key: ConnectionKey) -> Option<&Arc<dyn ManagedConnection>> {
        self.conns.get(key).map(|node| &node.conn)
    }

    /// Connections from most to least recently active.
    pub fn connections(&self) -> impl Iterator<Item = (ConnectionKey, &Arc<dyn ManagedConnection>)> {
        self.conns.iter().map(|(key, node)| (key, &node.conn))
    }

    /// The timer service.
    #[must_use]
    pub fn timer(&self) -> &T { &self.timer }

    /// Mutable access to the timer service.
    pub fn timer_mut(&mut self) -> &mut T { &mut self.timer }

    /// Start managing `conn` at the busy end of the list.
    ///
    /// Adding a connection this manager already holds only re-arms its
    /// timeout. The idle timeout is armed when `schedule_timeout` is set and
    /// the configured timeout is non-zero. A connection added while a drain
    /// is under way receives that phase's request straight away.
    pub fn add_connection(&mut self, conn: Arc<dyn ManagedConnection>, schedule_timeout: bool) -> ConnectionKey {
        let key = if let Some(&key) = self.by_identity.get(&identity(&conn)) {
            key
        } else {
            let id = identity(&conn);
            let key = self.conns.push_front(ManagedNode {
                conn,
                timeout_armed: false,
                notified: false,
                close_when_idle: false,
            });
            self.by_identity.insert(id, key);
            metrics::inc_connections();
            trace!("connection added: key={key}, total={}", self.conns.len());
            self.notify(|callback, manager| callback.on_connection_added(manager));
            self.catch_up(key);
            key
        };
        if schedule_timeout {
            if let Some(node) = self.conns.get_mut(key) {
                node.timeout_armed = true;
            }
            self.schedule_timeout(key);
        }
        key
    }

    /// Move `key` into `other`, returning its key there.
    ///
    /// Returns `None` if this manager does not hold `key`.
    pub fn transfer_to<U: TimerService>(
        &mut self,
        key: ConnectionKey,
        other: &mut ConnectionManager<U>,
        schedule_timeout: bool,
    ) -> Option<ConnectionKey> {
        let conn = self.remove_connection(key)?;
        Some(other.add_connection(conn, schedule_timeout))
    }

    /// Stop managing `key`: cancel its timeout, unlink it and notify the
    /// callback. Returns the connection.
    pub fn remove_connection(&mut self, key: ConnectionKey) -> Option<Arc<dyn ManagedConnection>> {
        if !self.conns.contains(key) {
            return None;
        }
        self.timer.cancel_timeout(TimeoutId::Connection(key));
        self.step_past(key);
        let node = self.conns.remove(key)?;
        self.by_identity.remove(&identity(&node.conn));
        metrics::dec_connections();
        trace!("connection removed: key={key}, remaining={}", self.conns.len());

        self.notify(|callback, manager| callback.on_connection_removed(manager));
        if self.conns.is_empty() {
            self.notify(|callback, manager| callback.on_empty(manager));
        }
        Some(node.conn)
    }

    /// The connection started work: move it to the busy end and cancel its
    /// idle timeout. Returns `false` for unknown keys.
    ///
    /// During a drain the move can take the connection behind the sweep
    /// cursor, so it is brought up to the current phase here.
    pub fn on_activated(&mut self, key: ConnectionKey) -> bool {
        if !self.conns.contains(key) {
            return false;
        }
        self.step_past(key);
        self.conns.move_to_front(key);
        self.timer.cancel_timeout(TimeoutId::Connection(key));
        self.catch_up(key);
        true
    }

    /// The connection went idle: move it to the idle end and re-arm its
    /// timeout. A connection asked to close when idle is removed instead.
    /// Returns `false` for unknown keys.
    pub fn on_deactivated(&mut self, key: ConnectionKey) -> bool {
        let Some(node) = self.conns.get(key) else {
            return false;
        };
        if node.close_when_idle {
            debug!("closing drained connection on idle: key={key}");
            self.remove_connection(key);
            return true;
        }
        self.step_past(key);
        self.conns.move_to_back(key);
        if self.idle_iterator.is_none() {
            self.idle_iterator = Some(key);
        }
        self.schedule_timeout(key);
        true
    }

    /// Begin a graceful shutdown and run the first sweep.
    ///
    /// With a non-zero `idle_grace` connections are first warned and the
    /// closing phase starts when the grace timer fires; otherwise closing
    /// starts immediately.
    pub fn initiate_graceful_shutdown(&mut self, idle_grace: Duration) {
        if idle_grace.is_zero() {
            info!("proceeding directly to closing idle connections");
            self.phase = DrainPhase::CloseWhenIdle;
        } else {
            info!("scheduling idle grace period of {idle_grace:?}");
            self.phase = DrainPhase::NotifyPendingShutdown;
            self.timer.schedule_timeout(TimeoutId::IdleGrace, idle_grace);
        }
        self.cursor = self.conns.front().map_or(Cursor::End, Cursor::At);
        self.drain_all_connections();
    }

    /// Run one drain sweep over at most [`DRAIN_BATCH`] connections,
    /// resuming where the previous sweep stopped.
    ///
    /// Sets [`needs_sweep`](Self::needs_sweep) when connections remain to be
    /// visited. Does nothing unless a drain phase is active.
    pub fn drain_all_connections(&mut self) {
        self.sweep_pending = false;
        let closing = match self.phase {
            DrainPhase::NotifyPendingShutdown => false,
            DrainPhase::CloseWhenIdle => true,
            DrainPhase::Running | DrainPhase::Complete => return,
        };

        let mut next = match self.cursor {
            Cursor::At(key) if self.conns.contains(key) => Some(key),
            Cursor::At(_) => self.conns.front(),
            Cursor::End => None,
        };
        let (mut cleared, mut kept) = (0usize, 0usize);
        while let Some(key) = next {
            if cleared + kept == DRAIN_BATCH {
                break;
            }
            next = self.conns.next(key);
            let Some(node) = self.conns.get_mut(key) else {
                continue;
            };
            let conn = Arc::clone(&node.conn);
            if closing {
                if conn.is_busy() {
                    kept += 1;
                    if !node.close_when_idle {
                        node.close_when_idle = true;
                        conn.close_when_idle();
                    }
                } else {
                    cleared += 1;
                    conn.close_when_idle();
                    self.remove_connection(key);
                }
            } else {
                kept += 1;
                if !node.notified {
                    node.notified = true;
                    conn.notify_pending_shutdown();
                }
            }
        }

        if closing {
            debug!("idle connections cleared: {cleared}, busy conns kept: {kept}");
        }
        match next {
            Some(key) => {
                self.cursor = Cursor::At(key);
                self.sweep_pending = true;
            }
            None => {
                self.cursor = Cursor::End;
                if closing {
                    self.phase = DrainPhase::Complete;
                    self.timer.cancel_timeout(TimeoutId::IdleGrace);
                    info!("drain complete; {} busy connections closing on idle", self.conns.len());
                }
            }
        }
    }

    /// Run pending sweeps to completion, yielding to the runtime between
    /// them.
    ///
    /// While connections are only being warned this returns once the last
    /// connection has been visited; the closing phase then waits for the
    /// grace timer to be handed to [`handle_timeout`](Self::handle_timeout).
    pub async fn drain(&mut self) {
        while self.sweep_pending {
            tokio::task::yield_now().await;
            self.drain_all_connections();
        }
    }

    /// Close every connection immediately.
    ///
    /// Cancels any drain in progress, calls `drop_connection` on every
    /// connection and fires `on_empty`. Per-connection removal callbacks are
    /// not fired.
    pub fn drop_all_connections(&mut self) {
        info!("connections to drop: {}", self.conns.len());
        self.timer.cancel_timeout(TimeoutId::IdleGrace);
        self.sweep_pending = false;
        self.cursor = Cursor::End;
        if matches!(
            self.phase,
            DrainPhase::NotifyPendingShutdown | DrainPhase::CloseWhenIdle
        ) {
            self.phase = DrainPhase::Complete;
        }

        let mut dropped = 0usize;
        while let Some(key) = self.conns.front() {
            let Some(node) = self.conns.remove(key) else {
                break;
            };
            self.timer.cancel_timeout(TimeoutId::Connection(key));
            self.by_identity.remove(&identity(&node.conn));
            metrics::dec_connections();
            dropped += 1;
            if dropped <= MAX_CONNS_TO_DUMP {
                node.conn.dump_connection_state(3);
            }
            node.conn.drop_connection();
        }
        self.idle_iterator = None;
        self.notify(|callback, manager| callback.on_empty(manager));
    }

    /// Drop up to `num` of the longest idle connections to reclaim capacity.
    ///
    /// Walks from the first idle connection and stops at the first one whose
    /// idle time is zero or not above the early-drop threshold. Always
    /// returns 0 when the threshold is not below the timeout.
    pub fn drop_idle_connections(&mut self, num: usize) -> usize {
        trace!("attempt to drop {num} idle connections");
        if self.early_drop_threshold >= self.timeout {
            return 0;
        }

        let mut count = 0;
        while count < num {
            let Some(key) = self.idle_iterator else {
                break;
            };
            let Some(conn) = self.get(key).map(Arc::clone) else {
                break;
            };
            let idle = conn.idle_time();
            if idle.is_zero() || idle <= self.early_drop_threshold {
                trace!(
                    "conn's idle time: {idle:?}, early drop threshold: {:?}, dropped {count}/{num}",
                    self.early_drop_threshold
                );
                break;
            }
            conn.timeout_expired();
            self.remove_connection(key);
            count += 1;
        }
        if count > 0 {
            metrics::inc_idle_drops(count);
        }
        count
    }

    /// React to an expired timeout armed by this manager.
    ///
    /// A connection timeout calls `timeout_expired` and removes the
    /// connection. The grace timeout starts the closing phase from the front
    /// of the list.
    pub fn handle_timeout(&mut self, id: TimeoutId) {
        match id {
            TimeoutId::Connection(key) => {
                if let Some(conn) = self.get(key).map(Arc::clone) {
                    debug!("idle timeout expired: key={key}");
                    conn.timeout_expired();
                    self.remove_connection(key);
                }
            }
            TimeoutId::IdleGrace => {
                if self.phase == DrainPhase::NotifyPendingShutdown {
                    debug!("idle grace period elapsed; closing idle connections");
                    self.phase = DrainPhase::CloseWhenIdle;
                    self.cursor = self.conns.front().map_or(Cursor::End, Cursor::At);
                    self.drain_all_connections();
                }
            }
        }
    }

    fn schedule_timeout(&mut self, key: ConnectionKey) {
        let armed = self.conns.get(key).is_some_and(|node| node.timeout_armed);
        if armed && !self.timeout.is_zero() {
            self.timer.schedule_timeout(TimeoutId::Connection(key), self.timeout);
        }
    }

    /// Give `key` the request of the current drain phase unless it already
    /// had it.
    fn catch_up(&mut self, key: ConnectionKey) {
        let phase = self.phase;
        let Some(node) = self.conns.get_mut(key) else {
            return;
        };
        match phase {
            DrainPhase::Running => {}
            DrainPhase::NotifyPendingShutdown => {
                if !node.notified {
                    node.notified = true;
                    node.conn.notify_pending_shutdown();
                }
            }
            DrainPhase::CloseWhenIdle | DrainPhase::Complete => {
                if !node.close_when_idle {
                    trace!("closing connection that joined the drain late: key={key}");
                    node.close_when_idle = true;
                    node.conn.close_when_idle();
                }
            }
        }
    }

    /// Advance the idle marker and the drain cursor off `key` before it is
    /// unlinked or moved.
    fn step_past(&mut self, key: ConnectionKey) {
        if self.idle_iterator == Some(key) {
            self.idle_iterator = self.conns.next(key);
        }
        if self.cursor == Cursor::At(key) {
            self.cursor = self.conns.next(key).map_or(Cursor::End, Cursor::At);
        }
    }

    fn notify(&mut self, call: impl FnOnce(&mut dyn ConnectionManagerCallback<T>, &Self)) {
        if let Some(mut callback) = self.callback.take() {
            call(callback.as_mut(), self);
            self.callback = Some(callback);
        }
    }
}
