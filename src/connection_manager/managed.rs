//! Capabilities a connection exposes to its manager.

use std::time::Duration;

/// A connection whose lifetime is tracked by a
/// [`ConnectionManager`](super::ConnectionManager).
///
/// Every method takes `&self`; implementations share their state with the
/// task driving the connection, typically through atomics. The manager calls
/// these from its own task and never waits on them.
pub trait ManagedConnection: Send + Sync {
    /// Whether the connection has application work in flight.
    fn is_busy(&self) -> bool;

    /// How long the connection has been idle. Zero while busy.
    fn idle_time(&self) -> Duration;

    /// Close as soon as the connection is idle, immediately if it already is.
    fn close_when_idle(&self);

    /// Advisory notice that a graceful shutdown has begun.
    fn notify_pending_shutdown(&self);

    /// Close immediately, abandoning in-flight work.
    fn drop_connection(&self);

    /// The idle timeout elapsed; the manager removes the connection right
    /// after this returns.
    fn timeout_expired(&self);

    /// Log diagnostic state at `verbosity`.
    fn dump_connection_state(&self, _verbosity: u8) {}
}
