//! Task owning the server's [`ConnectionManager`].
//!
//! The manager is single-owner, so connection tasks talk to it over an
//! unbounded channel. The task also drives the manager's timer wheel and,
//! once shutdown starts, its graceful drain.

use std::{sync::Arc, time::Duration};

use log::{debug, info, warn};
use tokio::{
    select,
    sync::{mpsc, oneshot},
    task::yield_now,
    time::sleep,
};
use tokio_util::sync::CancellationToken;

use super::connection::ConnectionHandle;
use crate::connection_manager::{ConnectionKey, ConnectionManager};

pub(super) enum Command {
    Add {
        conn: Arc<ConnectionHandle>,
        reply: oneshot::Sender<ConnectionKey>,
    },
    Activated(ConnectionKey),
    Deactivated(ConnectionKey),
    Remove(ConnectionKey),
}

/// Sending side of the manager task's command channel.
#[derive(Clone, Debug)]
pub(super) struct ManagerHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl ManagerHandle {
    /// Register `conn`, returning its key. `None` once the manager task has
    /// stopped.
    pub(super) async fn add(&self, conn: Arc<ConnectionHandle>) -> Option<ConnectionKey> {
        let (reply, key) = oneshot::channel();
        self.tx.send(Command::Add { conn, reply }).ok()?;
        key.await.ok()
    }

    pub(super) fn activated(&self, key: ConnectionKey) { self.send(Command::Activated(key)); }

    pub(super) fn deactivated(&self, key: ConnectionKey) { self.send(Command::Deactivated(key)); }

    pub(super) fn remove(&self, key: ConnectionKey) { self.send(Command::Remove(key)); }

    // A stopped manager has already dropped every connection.
    fn send(&self, command: Command) { let _ = self.tx.send(command); }
}

pub(super) fn channel() -> (ManagerHandle, mpsc::UnboundedReceiver<Command>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ManagerHandle { tx }, rx)
}

#[derive(Clone, Copy, Debug)]
pub(super) struct ManagerOptions {
    pub max_connections: Option<usize>,
    pub drain_grace: Duration,
    pub drain_timeout: Duration,
}

/// Serve commands and timeouts until `shutdown` is cancelled, then drain.
///
/// Returns once every connection has left the manager or the drain timed
/// out and the remainder were dropped.
pub(super) async fn run_manager(
    mut manager: ConnectionManager,
    mut commands: mpsc::UnboundedReceiver<Command>,
    options: ManagerOptions,
    shutdown: CancellationToken,
) {
    loop {
        select! {
            biased;

            () = shutdown.cancelled() => break,
            command = commands.recv() => match command {
                Some(command) => apply(&mut manager, command, options.max_connections),
                None => return,
            },
            id = manager.timer_mut().next_expired() => manager.handle_timeout(id),
        }
    }

    info!("draining connections: count={}", manager.num_connections());
    manager.initiate_graceful_shutdown(options.drain_grace);
    let deadline = sleep(options.drain_timeout);
    tokio::pin!(deadline);
    while !manager.is_empty() {
        if manager.needs_sweep() {
            yield_now().await;
            manager.drain_all_connections();
            continue;
        }
        select! {
            biased;

            () = &mut deadline => {
                warn!(
                    "drain timed out; dropping remaining connections: count={}",
                    manager.num_connections()
                );
                break;
            }
            command = commands.recv() => match command {
                Some(command) => apply(&mut manager, command, None),
                None => break,
            },
            id = manager.timer_mut().next_expired() => manager.handle_timeout(id),
        }
    }
    manager.drop_all_connections();
}

fn apply(manager: &mut ConnectionManager, command: Command, max_connections: Option<usize>) {
    match command {
        Command::Add { conn, reply } => {
            let key = manager.add_connection(conn, true);
            if reply.send(key).is_err() {
                manager.remove_connection(key);
                return;
            }
            let excess = max_connections.map_or(0, |max| manager.num_connections().saturating_sub(max));
            if excess > 0 {
                let dropped = manager.drop_idle_connections(excess);
                debug!("connection limit exceeded: excess={excess}, dropped={dropped}");
            }
        }
        Command::Activated(key) => {
            manager.on_activated(key);
        }
        Command::Deactivated(key) => {
            manager.on_deactivated(key);
        }
        Command::Remove(key) => {
            manager.remove_connection(key);
        }
    }
}
