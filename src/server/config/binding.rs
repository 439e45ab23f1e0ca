//! Listener binding for [`PipelineServer`].

use std::{
    net::{SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
};

use bytes::Bytes;
use tokio::net::TcpListener;

use crate::{
    pipeline::PipelineFactory,
    server::{Bound, PipelineServer, ServerError, ServerState, Unbound},
};

impl<F, W, S> PipelineServer<F, W, S>
where
    F: PipelineFactory<Bytes, W> + 'static,
    S: ServerState,
{
    /// Bind to `addr`, replacing any listener bound earlier.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::{
    ///     net::{Ipv4Addr, SocketAddr},
    ///     sync::Arc,
    /// };
    ///
    /// use bytes::Bytes;
    /// use wirechain::{pipeline::Pipeline, server::PipelineServer, transport::Transport};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), wirechain::server::ServerError> {
    /// let server = PipelineServer::new(|transport: Arc<dyn Transport>| {
    ///     Pipeline::<Bytes>::with_transport(transport)
    /// })
    /// .bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))?;
    /// assert!(server.local_addr().is_some());
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if binding or configuring the listener
    /// fails.
    pub fn bind(self, addr: SocketAddr) -> Result<PipelineServer<F, W, Bound>, ServerError> {
        let std_listener = StdTcpListener::bind(addr).map_err(ServerError::Bind)?;
        self.bind_listener(std_listener)
    }

    /// Bind to an existing standard library listener.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if configuring the listener fails.
    pub fn bind_listener(
        self,
        std_listener: StdTcpListener,
    ) -> Result<PipelineServer<F, W, Bound>, ServerError> {
        std_listener
            .set_nonblocking(true)
            .map_err(ServerError::Bind)?;
        let listener = TcpListener::from_std(std_listener).map_err(ServerError::Bind)?;

        let PipelineServer {
            factory,
            workers,
            manager,
            max_connections,
            drain_grace,
            drain_timeout,
            backoff,
            ready_tx,
            _pipeline,
            ..
        } = self;
        Ok(PipelineServer {
            factory,
            workers,
            manager,
            max_connections,
            drain_grace,
            drain_timeout,
            backoff,
            ready_tx,
            state: Bound {
                listener: Arc::new(listener),
            },
            _pipeline,
        })
    }
}

impl<F, W> PipelineServer<F, W, Unbound>
where
    F: PipelineFactory<Bytes, W> + 'static,
{
    /// Return `None` as the server is not bound.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> { None }
}

impl<F, W> PipelineServer<F, W, Bound>
where
    F: PipelineFactory<Bytes, W> + 'static,
{
    /// Returns the bound address, or `None` if retrieving it fails.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> { self.state.listener.local_addr().ok() }
}
