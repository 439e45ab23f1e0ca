//! Observer notified of membership changes.

use super::ConnectionManager;
use crate::timer::TimerService;

/// Receives membership notifications from a [`ConnectionManager`].
///
/// Callbacks get shared access to the manager and run synchronously inside
/// the operation that triggered them.
pub trait ConnectionManagerCallback<T: TimerService>: Send {
    /// A connection was added.
    fn on_connection_added(&mut self, manager: &ConnectionManager<T>);

    /// A connection was removed.
    fn on_connection_removed(&mut self, manager: &ConnectionManager<T>);

    /// The manager holds no connections. Fired after the removal of the last
    /// connection and at the end of
    /// [`drop_all_connections`](ConnectionManager::drop_all_connections).
    fn on_empty(&mut self, manager: &ConnectionManager<T>);
}
