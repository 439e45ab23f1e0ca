//! Tokio TCP server running one [`Pipeline`](crate::pipeline::Pipeline) per
//! connection.
//!
//! `PipelineServer` spawns worker tasks that accept TCP connections. Each
//! accepted stream gets a fresh pipeline from the configured
//! [`PipelineFactory`], wired to a [`StreamTransport`](crate::transport::StreamTransport)
//! over the write half of the socket. Socket reads are pushed into the front
//! of the pipeline and writes queued by handlers are flushed after each read.
//!
//! Every connection is registered with a single
//! [`ConnectionManager`](crate::connection_manager::ConnectionManager) owned
//! by a dedicated task. The manager arms idle timeouts, sheds idle
//! connections when a connection limit is exceeded and drains connections
//! gracefully on shutdown.

use core::marker::PhantomData;
use std::{sync::Arc, time::Duration};

use tokio::{net::TcpListener, sync::oneshot};

use crate::{connection_manager::ConnectionManagerConfig, pipeline::PipelineFactory};

/// Tokio-based server feeding TCP connections through pipelines.
///
/// The server carries a typestate `S` indicating whether it is [`Unbound`]
/// or [`Bound`]. New servers start `Unbound` and must call
/// [`bind`](PipelineServer::bind) or
/// [`bind_listener`](PipelineServer::bind_listener) before running.
///
/// `W` is the outbound entry type of the pipelines the factory builds. The
/// server never writes into the back of a pipeline, so any `W` works.
pub struct PipelineServer<F, W = (), S = Unbound>
where
    F: PipelineFactory<bytes::Bytes, W> + 'static,
    S: ServerState,
{
    pub(crate) factory: Arc<F>,
    pub(crate) workers: usize,
    pub(crate) manager: ConnectionManagerConfig,
    pub(crate) max_connections: Option<usize>,
    pub(crate) drain_grace: Duration,
    pub(crate) drain_timeout: Duration,
    pub(crate) backoff: BackoffConfig,
    /// Single-use readiness notification, sent once all workers are spawned.
    pub(crate) ready_tx: Option<oneshot::Sender<()>>,
    pub(crate) state: S,
    pub(crate) _pipeline: PhantomData<fn() -> W>,
}

/// Marker indicating the server has not yet bound a listener.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbound;

/// Marker indicating the server is bound to a TCP listener.
#[derive(Debug, Clone)]
pub struct Bound {
    pub(crate) listener: Arc<TcpListener>,
}

/// Trait implemented by [`Unbound`] and [`Bound`] to model binding typestate.
pub trait ServerState: sealed::Sealed {}

mod sealed {
    //! Prevent external implementations of [`ServerState`].

    pub trait Sealed {}
    impl Sealed for super::Unbound {}
    impl Sealed for super::Bound {}
}

impl ServerState for Unbound {}
impl ServerState for Bound {}

mod config;
mod connection;
pub mod error;
mod manager_task;
mod runtime;

pub use config::binding;
pub use connection::{ConnectionHandle, ConnectionId};
pub use error::ServerError;
pub use runtime::BackoffConfig;

#[cfg(test)]
pub(crate) mod test_util;
